//! In-flight authorization attempts keyed by state token
//!
//! Every call to `initiate_flow` registers a [`PendingAuthorization`] here
//! before the user is sent to the provider. The callback handler consumes it
//! with [`PendingAuthorizationRegistry::take`], which removes the entry so a
//! state token can never be replayed.
//!
//! Expiry is lazy: entries older than the registry TTL are reported as
//! missing by `take` even when they are still physically stored, and are
//! swept whenever a new flow starts. Misses and
//! expiries produce the same [`ToolAuthError::InvalidState`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, ToolAuthError};

/// Default lifetime of a pending authorization.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(10 * 60);

// ---------------------------------------------------------------------------
// PendingAuthorization
// ---------------------------------------------------------------------------

/// A registered authorization attempt awaiting its callback.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// The opaque state token sent to the provider.
    pub state: String,
    /// Provider being authorized.
    pub provider: String,
    /// PKCE verifier matching the challenge sent with the authorization URL.
    pub code_verifier: String,
    /// When the attempt was registered.
    pub created_at: DateTime<Utc>,
    /// Where the user should land once the flow completes.
    pub return_url: Option<String>,
}

impl PendingAuthorization {
    fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - self.created_at > max_age,
            // An age too large for chrono never expires anything.
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// PendingAuthorizationRegistry
// ---------------------------------------------------------------------------

/// Thread-safe registry of [`PendingAuthorization`] entries.
///
/// # Examples
///
/// ```
/// use toolauth::auth::pending::PendingAuthorizationRegistry;
///
/// let registry = PendingAuthorizationRegistry::default();
/// registry.add("state-1", "github", "verifier", None);
///
/// let pending = registry.take("state-1").unwrap();
/// assert_eq!(pending.provider, "github");
///
/// // A state can only be consumed once.
/// assert!(registry.take("state-1").is_err());
/// ```
#[derive(Debug)]
pub struct PendingAuthorizationRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<String, PendingAuthorization>>,
}

impl Default for PendingAuthorizationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TTL)
    }
}

impl PendingAuthorizationRegistry {
    /// Creates an empty registry whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingAuthorization>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new attempt under `state`.
    ///
    /// A second `add` with the same state replaces the first, keeping at most
    /// one live entry per state value.
    pub fn add(&self, state: &str, provider: &str, code_verifier: &str, return_url: Option<&str>) {
        self.insert(PendingAuthorization {
            state: state.to_string(),
            provider: provider.to_string(),
            code_verifier: code_verifier.to_string(),
            created_at: Utc::now(),
            return_url: return_url.map(str::to_string),
        });
    }

    /// Registers a fully built entry, keeping its `created_at`.
    pub fn insert(&self, pending: PendingAuthorization) {
        tracing::debug!(provider = %pending.provider, "Registered pending authorization");
        self.lock().insert(pending.state.clone(), pending);
    }

    /// Removes and returns the entry for `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolAuthError::InvalidState`] when no entry matches `state`
    /// byte-for-byte, or when the matching entry is older than the TTL.
    pub fn take(&self, state: &str) -> Result<PendingAuthorization> {
        let entry = self.lock().remove(state);
        match entry {
            Some(pending) if !pending.is_older_than(self.ttl, Utc::now()) => Ok(pending),
            Some(pending) => {
                tracing::debug!(provider = %pending.provider, "Pending authorization expired");
                Err(ToolAuthError::InvalidState.into())
            }
            None => Err(ToolAuthError::InvalidState.into()),
        }
    }

    /// Provider of the live entry for `state`, without consuming it.
    pub fn provider_for(&self, state: &str) -> Option<String> {
        self.lock()
            .get(state)
            .filter(|pending| !pending.is_older_than(self.ttl, Utc::now()))
            .map(|pending| pending.provider.clone())
    }

    /// Drops every entry older than `max_age` and returns how many were removed.
    pub fn expire(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_older_than(max_age, now));
        before - entries.len()
    }

    /// Removes every entry.
    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
