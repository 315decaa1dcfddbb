//! Provider token store tests
//!
//! The in-memory store is exercised everywhere; keyring-backed tests need a
//! system credential store and are ignored by default.

use toolauth::auth::token_store::{
    KeyringTokenStore, MemoryTokenStore, ProviderTokenRecord, TokenStore,
};

fn record(token: &str) -> ProviderTokenRecord {
    let mut record = ProviderTokenRecord::bearer(token, 3600);
    record.scopes = Some(vec!["repo".to_string(), "read:user".to_string()]);
    record
}

fn exercise_isolation(store: &dyn TokenStore) {
    let github = record("gh");
    let slack = record("sl");
    store.set("github", &github).unwrap();
    store.set("slack", &slack).unwrap();
    assert_eq!(store.get("github").unwrap(), Some(github));

    store.clear("github").unwrap();
    assert!(store.get("github").unwrap().is_none());
    assert_eq!(store.get("slack").unwrap(), Some(slack));
}

#[test]
fn test_memory_store_returns_equal_copy() {
    let store = MemoryTokenStore::new();
    let original = record("gh");
    store.set("github", &original).unwrap();
    assert_eq!(store.get("github").unwrap(), Some(original));
}

#[test]
fn test_memory_store_isolates_providers() {
    exercise_isolation(&MemoryTokenStore::new());
}

#[test]
fn test_memory_store_clear_all_and_get_all() {
    let store = MemoryTokenStore::new();
    store.set("github", &record("gh")).unwrap();
    store.set("slack", &record("sl")).unwrap();
    assert_eq!(store.get_all().unwrap().len(), 2);

    store.clear_all().unwrap();
    assert!(store.get_all().unwrap().is_empty());
}

#[test]
fn test_clearing_missing_provider_is_ok() {
    let store = MemoryTokenStore::new();
    store.clear("never-set").unwrap();
}

#[test]
fn test_record_expiry_buffer() {
    assert!(!ProviderTokenRecord::bearer("t", 3600).is_expired());
    assert!(ProviderTokenRecord::bearer("t", 30).is_expired());
}

#[test]
fn test_record_wire_format_is_camel_case() {
    let record: ProviderTokenRecord = serde_json::from_value(serde_json::json!({
        "accessToken": "abc",
        "tokenType": "Bearer",
        "expiresIn": 3600,
        "scopes": ["repo"]
    }))
    .unwrap();
    assert_eq!(record.access_token, "abc");
    assert!(record.expires_at.is_none());
    assert!(record.with_computed_expiry().expires_at.is_some());
}

#[test]
#[ignore = "requires system keyring"]
fn test_keyring_store_isolates_providers() {
    let store = KeyringTokenStore::new("toolauth-test");
    store.clear_all().unwrap();
    exercise_isolation(&store);
    store.clear_all().unwrap();
}
