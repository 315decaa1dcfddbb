//! Per-provider access-token persistence
//!
//! [`TokenStore`] is a plain key-value interface keyed by provider id. The
//! rest of the crate only talks to the trait, so the storage backend is a
//! deployment choice:
//!
//! - [`MemoryTokenStore`] keeps tokens for the lifetime of the process.
//! - [`KeyringTokenStore`] persists tokens in the operating system's native
//!   credential store (Keychain on macOS, Secret Service on Linux, Windows
//!   Credential Manager on Windows) so they survive restarts.
//!
//! No implementation performs network calls.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolAuthError};

// ---------------------------------------------------------------------------
// ProviderTokenRecord
// ---------------------------------------------------------------------------

/// An access token issued for one provider.
///
/// Field names are `camelCase` on the wire so the record can be read straight
/// from the code-exchange response.
///
/// # Examples
///
/// ```
/// use toolauth::auth::token_store::ProviderTokenRecord;
///
/// let record = ProviderTokenRecord::bearer("gho_abc", 3600);
/// assert_eq!(record.token_type, "Bearer");
/// assert!(!record.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTokenRecord {
    /// The bearer credential attached to tool calls.
    pub access_token: String,
    /// Token type, typically `"Bearer"`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds as reported at issue time.
    #[serde(default)]
    pub expires_in: u64,
    /// Absolute expiry, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl ProviderTokenRecord {
    /// Builds a bearer token expiring `expires_in` seconds from now.
    pub fn bearer(access_token: impl Into<String>, expires_in: u64) -> Self {
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .map(|d| Utc::now() + d);
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in,
            expires_at,
            scopes: None,
        }
    }

    /// Fills in `expires_at` from `expires_in` when the server omitted it.
    pub fn with_computed_expiry(mut self) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = i64::try_from(self.expires_in)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .map(|d| Utc::now() + d);
        }
        self
    }

    /// Returns `true` when the token is expired or expires within a minute.
    ///
    /// Records without `expires_at` never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => Utc::now() >= expires_at - chrono::Duration::seconds(60),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Storage-agnostic access to provider tokens.
pub trait TokenStore: Send + Sync {
    /// Returns the token stored for `provider`, if any.
    fn get(&self, provider: &str) -> Result<Option<ProviderTokenRecord>>;

    /// Stores `record` for `provider`, replacing any previous token.
    fn set(&self, provider: &str, record: &ProviderTokenRecord) -> Result<()>;

    /// Removes the token for `provider`. A no-op when none is stored.
    fn clear(&self, provider: &str) -> Result<()>;

    /// Removes every stored token.
    fn clear_all(&self) -> Result<()>;

    /// Returns every stored token keyed by provider id.
    fn get_all(&self) -> Result<HashMap<String, ProviderTokenRecord>>;
}

// ---------------------------------------------------------------------------
// MemoryTokenStore
// ---------------------------------------------------------------------------

/// Process-local token store.
///
/// # Examples
///
/// ```
/// use toolauth::auth::token_store::{MemoryTokenStore, ProviderTokenRecord, TokenStore};
///
/// let store = MemoryTokenStore::new();
/// store.set("github", &ProviderTokenRecord::bearer("tok", 60)).unwrap();
/// assert!(store.get("github").unwrap().is_some());
/// assert!(store.get("gmail").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, ProviderTokenRecord>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProviderTokenRecord>> {
        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, provider: &str) -> Result<Option<ProviderTokenRecord>> {
        Ok(self.lock().get(provider).cloned())
    }

    fn set(&self, provider: &str, record: &ProviderTokenRecord) -> Result<()> {
        self.lock().insert(provider.to_string(), record.clone());
        Ok(())
    }

    fn clear(&self, provider: &str) -> Result<()> {
        self.lock().remove(provider);
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn get_all(&self) -> Result<HashMap<String, ProviderTokenRecord>> {
        Ok(self.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// KeyringTokenStore
// ---------------------------------------------------------------------------

const INDEX_ACCOUNT: &str = "providers";

/// Token store backed by the OS keyring.
///
/// Each provider's token is serialized to JSON under the service name
/// `{namespace}-{provider}`. The credential store cannot enumerate entries,
/// so an index entry under `{namespace}-index` lists the providers that have
/// a token.
///
/// # Examples
///
/// ```no_run
/// use toolauth::auth::token_store::{KeyringTokenStore, ProviderTokenRecord, TokenStore};
///
/// let store = KeyringTokenStore::new("toolauth");
/// store.set("github", &ProviderTokenRecord::bearer("tok", 3600)).unwrap();
/// assert!(store.get_all().unwrap().contains_key("github"));
/// ```
#[derive(Debug)]
pub struct KeyringTokenStore {
    namespace: String,
    index_lock: Mutex<()>,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new("toolauth")
    }
}

impl KeyringTokenStore {
    /// Creates a store whose service names are prefixed with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn service_name(&self, provider: &str) -> String {
        format!("{}-{}", self.namespace, provider)
    }

    fn entry(&self, provider: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name(provider), provider)
            .map_err(|e| ToolAuthError::Keyring(e).into())
    }

    fn index_entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&format!("{}-index", self.namespace), INDEX_ACCOUNT)
            .map_err(|e| ToolAuthError::Keyring(e).into())
    }

    fn read_index(&self) -> Result<BTreeSet<String>> {
        match self.index_entry()?.get_password() {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(keyring::Error::NoEntry) => Ok(BTreeSet::new()),
            Err(e) => Err(ToolAuthError::Keyring(e).into()),
        }
    }

    fn write_index(&self, providers: &BTreeSet<String>) -> Result<()> {
        let entry = self.index_entry()?;
        if providers.is_empty() {
            return match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(ToolAuthError::Keyring(e).into()),
            };
        }
        entry
            .set_password(&serde_json::to_string(providers)?)
            .map_err(ToolAuthError::Keyring)?;
        Ok(())
    }

    fn update_index(&self, update: impl FnOnce(&mut BTreeSet<String>)) -> Result<()> {
        let _guard = self
            .index_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut providers = self.read_index()?;
        update(&mut providers);
        self.write_index(&providers)
    }

    fn delete_entry(&self, provider: &str) -> Result<()> {
        match self.entry(provider)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ToolAuthError::Keyring(e).into()),
        }
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, provider: &str) -> Result<Option<ProviderTokenRecord>> {
        match self.entry(provider)?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ToolAuthError::Keyring(e).into()),
        }
    }

    fn set(&self, provider: &str, record: &ProviderTokenRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.entry(provider)?
            .set_password(&json)
            .map_err(ToolAuthError::Keyring)?;
        self.update_index(|providers| {
            providers.insert(provider.to_string());
        })
    }

    fn clear(&self, provider: &str) -> Result<()> {
        self.delete_entry(provider)?;
        self.update_index(|providers| {
            providers.remove(provider);
        })
    }

    fn clear_all(&self) -> Result<()> {
        for provider in self.read_index()? {
            self.delete_entry(&provider)?;
        }
        self.update_index(|providers| providers.clear())
    }

    fn get_all(&self) -> Result<HashMap<String, ProviderTokenRecord>> {
        let mut all = HashMap::new();
        for provider in self.read_index()? {
            if let Some(record) = self.get(&provider)? {
                all.insert(provider, record);
            }
        }
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_expired_within_buffer_window() {
        let mut record = ProviderTokenRecord::bearer("tok", 0);
        record.expires_at = Some(Utc::now() + chrono::Duration::seconds(30));
        assert!(record.is_expired());
    }

    #[test]
    fn test_record_without_expiry_never_expires() {
        let mut record = ProviderTokenRecord::bearer("tok", 0);
        record.expires_at = None;
        assert!(!record.is_expired());
    }

    #[test]
    fn test_record_deserializes_exchange_response() {
        let record: ProviderTokenRecord = serde_json::from_value(serde_json::json!({
            "accessToken": "gho_1",
            "tokenType": "Bearer",
            "expiresIn": 3600,
            "scopes": ["repo"]
        }))
        .unwrap();
        assert_eq!(record.access_token, "gho_1");
        assert_eq!(record.scopes, Some(vec!["repo".to_string()]));
        assert!(record.expires_at.is_none());
        assert!(record.with_computed_expiry().expires_at.is_some());
    }

    #[test]
    fn test_record_defaults_token_type() {
        let record: ProviderTokenRecord =
            serde_json::from_value(serde_json::json!({ "accessToken": "t" })).unwrap();
        assert_eq!(record.token_type, "Bearer");
        assert_eq!(record.expires_in, 0);
    }

    #[test]
    fn test_memory_store_isolates_providers() {
        let store = MemoryTokenStore::new();
        store.set("a", &ProviderTokenRecord::bearer("ta", 60)).unwrap();
        store.set("b", &ProviderTokenRecord::bearer("tb", 60)).unwrap();
        store.clear("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert_eq!(store.get("b").unwrap().unwrap().access_token, "tb");
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_keyring_service_name_has_namespace_prefix() {
        let store = KeyringTokenStore::new("toolauth");
        assert_eq!(store.service_name("github"), "toolauth-github");
    }

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_store_roundtrip() {
        let store = KeyringTokenStore::new("toolauth-unit-test");
        let record = ProviderTokenRecord::bearer("keyring_tok", 3600);
        store.set("github", &record).unwrap();
        assert_eq!(store.get("github").unwrap(), Some(record));
        assert!(store.get_all().unwrap().contains_key("github"));
        store.clear_all().unwrap();
        assert!(store.get("github").unwrap().is_none());
    }
}
