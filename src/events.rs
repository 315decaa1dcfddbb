//! Authorization lifecycle events
//!
//! The client publishes a closed set of events as the authorization state of
//! its providers changes. Listeners subscribe per [`AuthEventKind`] and are
//! called synchronously, in registration order, on the emitting task.
//!
//! A panicking listener is logged and skipped; the remaining listeners still
//! run and the emitter carries on.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// An authorization lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// An authorization flow is about to start.
    Started {
        /// Provider being authorized.
        provider: String,
    },
    /// A flow finished and a token was stored.
    Complete {
        /// Provider that was authorized.
        provider: String,
        /// Token expiry, when known.
        expires_at: Option<DateTime<Utc>>,
        /// Granted scopes, when known.
        scopes: Option<Vec<String>>,
    },
    /// A flow, tool call or disconnect failed with an authentication error.
    Error {
        /// Provider involved, when it could be determined.
        provider: Option<String>,
        /// Error description.
        message: String,
    },
    /// A provider's grant was revoked.
    Disconnect {
        /// Provider that was disconnected.
        provider: String,
    },
    /// Every provider token was forgotten.
    Logout,
}

impl AuthEvent {
    /// The kind used to route this event to listeners.
    pub fn kind(&self) -> AuthEventKind {
        match self {
            Self::Started { .. } => AuthEventKind::Started,
            Self::Complete { .. } => AuthEventKind::Complete,
            Self::Error { .. } => AuthEventKind::Error,
            Self::Disconnect { .. } => AuthEventKind::Disconnect,
            Self::Logout => AuthEventKind::Logout,
        }
    }
}

/// Event kinds listeners subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEventKind {
    /// `auth:started`
    Started,
    /// `auth:complete`
    Complete,
    /// `auth:error`
    Error,
    /// `auth:disconnect`
    Disconnect,
    /// `auth:logout`
    Logout,
}

impl AuthEventKind {
    /// Wire-style event name, e.g. `auth:complete`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "auth:started",
            Self::Complete => "auth:complete",
            Self::Error => "auth:error",
            Self::Disconnect => "auth:disconnect",
            Self::Logout => "auth:logout",
        }
    }
}

impl std::fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one registered listener; pass it to [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// In-process publish/subscribe for [`AuthEvent`]s.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use toolauth::events::{AuthEvent, AuthEventKind, EventBus};
///
/// let bus = EventBus::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let id = bus.on(AuthEventKind::Logout, move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// bus.emit(&AuthEvent::Logout);
/// assert!(bus.off(id));
/// bus.emit(&AuthEvent::Logout);
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<AuthEventKind, Vec<(ListenerId, Listener)>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events of `kind`.
    pub fn on(
        &self,
        kind: AuthEventKind,
        listener: impl Fn(&AuthEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes exactly the listener registered under `id`.
    ///
    /// Returns `false` if it was already removed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        for registered in listeners.values_mut() {
            if let Some(pos) = registered.iter().position(|(lid, _)| *lid == id) {
                registered.remove(pos);
                return true;
            }
        }
        false
    }

    /// Delivers `event` to every listener registered for its kind.
    pub fn emit(&self, event: &AuthEvent) {
        let kind = event.kind();
        // Snapshot so listeners may call on/off without deadlocking.
        let listeners: Vec<Listener> = self
            .lock()
            .get(&kind)
            .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();

        tracing::debug!(event = %kind, listeners = listeners.len(), "Emitting auth event");
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(event = %kind, "Auth event listener panicked");
            }
        }
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AuthEventKind, Vec<(ListenerId, Listener)>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
