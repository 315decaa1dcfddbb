//! Process-wide client slot
//!
//! Some embedders want one shared [`Client`] without threading it through
//! every call site. The slot starts empty: [`install`] puts a client in,
//! [`client`] hands out clones of it, and [`clear`] empties it again (tests
//! call this between cases).

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::client::Client;
use crate::error::{Result, ToolAuthError};

fn slot() -> MutexGuard<'static, Option<Arc<Client>>> {
    static SLOT: OnceLock<Mutex<Option<Arc<Client>>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Installs `client` as the shared client, returning the one it replaces.
pub fn install(client: Arc<Client>) -> Option<Arc<Client>> {
    slot().replace(client)
}

/// The shared client.
///
/// # Errors
///
/// Returns [`ToolAuthError::NotInitialized`] if nothing is installed.
pub fn client() -> Result<Arc<Client>> {
    slot()
        .clone()
        .ok_or_else(|| ToolAuthError::NotInitialized.into())
}

/// Empties the slot, returning the client that was installed.
pub fn clear() -> Option<Arc<Client>> {
    slot().take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token_store::MemoryTokenStore;
    use crate::config::Config;
    use serial_test::serial;

    fn build() -> Arc<Client> {
        Arc::new(
            Client::builder(&Config::default())
                .with_token_store(Arc::new(MemoryTokenStore::new()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    #[serial]
    fn test_empty_slot_is_not_initialized() {
        clear();
        let err = client().unwrap_err();
        assert!(matches!(
            crate::error::kind(&err),
            Some(ToolAuthError::NotInitialized)
        ));
    }

    #[test]
    #[serial]
    fn test_install_then_clear() {
        clear();
        let installed = build();
        assert!(install(installed.clone()).is_none());
        assert!(Arc::ptr_eq(&client().unwrap(), &installed));
        assert!(clear().is_some());
        assert!(client().is_err());
    }
}
