//! OAuth session core
//!
//! # Module Layout
//!
//! - [`pkce`]        -- PKCE `S256` verifier/challenge pairs and state tokens
//! - [`pending`]     -- In-flight authorizations keyed by state token
//! - [`token_store`] -- Per-provider token persistence (memory or OS keyring)
//! - [`api`]         -- Client for the tool server's OAuth endpoints
//! - [`popup`]       -- Presenting the authorization URL (popup, redirect, hook)
//! - [`manager`]     -- The flow coordinator tying the above together

pub mod api;
pub mod manager;
pub mod pending;
pub mod pkce;
pub mod popup;
pub mod token_store;

use std::sync::Arc;

use crate::auth::pending::PendingAuthorizationRegistry;
use crate::auth::token_store::{MemoryTokenStore, TokenStore};

/// Shared authorization state: one pending-authorization registry and one
/// token store.
///
/// Cloning is cheap and every clone sees the same state.
///
/// # Examples
///
/// ```
/// use toolauth::auth::AuthContext;
///
/// let ctx = AuthContext::in_memory();
/// let other = ctx.clone();
/// ctx.pending.add("s", "github", "v", None);
/// assert_eq!(other.pending.len(), 1);
/// ```
#[derive(Clone)]
pub struct AuthContext {
    /// In-flight authorizations.
    pub pending: Arc<PendingAuthorizationRegistry>,
    /// Provider tokens.
    pub tokens: Arc<dyn TokenStore>,
}

impl AuthContext {
    /// Creates a context from its parts.
    pub fn new(pending: Arc<PendingAuthorizationRegistry>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { pending, tokens }
    }

    /// A context with a default registry and an in-memory token store.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(PendingAuthorizationRegistry::default()),
            Arc::new(MemoryTokenStore::new()),
        )
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
