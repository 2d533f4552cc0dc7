use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;

use super::SessionStorage;

/// Default keychain service name
pub const SERVICE_NAME: &str = "docgate";

/// Stores each session key as a separate OS keychain entry.
///
/// Entry handles are reused per key, so a credential builder that keeps
/// state per handle (keyring's mock store) still reads back what was set.
pub struct KeyringStorage {
    service: String,
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entry<T>(&self, key: &str, f: impl FnOnce(&Entry) -> T) -> Result<T> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) {
            let entry =
                Entry::new(&self.service, key).context("Failed to create keyring entry")?;
            entries.insert(key.to_string(), entry);
        }
        let entry = entries
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Keyring entry vanished: {}", key))?;
        Ok(f(entry))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.with_entry(key, Entry::get_password)? {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session entry from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entry(key, |entry| entry.set_password(value))?
            .context("Failed to store session entry in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.with_entry(key, Entry::delete_credential)? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session entry from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::api::ScriptedTransport;
    use crate::auth::{SessionStore, TOKEN_KEY};

    fn mock_store() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
    }

    #[test]
    fn test_set_get_remove() {
        mock_store();
        let storage = KeyringStorage::with_service("docgate-test-set-get");

        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        storage.set(TOKEN_KEY, "abc").unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));

        storage.set(TOKEN_KEY, "def").unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("def"));

        storage.remove(TOKEN_KEY).unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        // Removing twice is fine
        storage.remove(TOKEN_KEY).unwrap();
    }

    #[tokio::test]
    async fn test_login_is_live_over_keychain() {
        mock_store();
        let storage = Arc::new(KeyringStorage::with_service("docgate-test-login"));
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({"token": "abc"}));
        let store = SessionStore::new(storage.clone(), transport).with_ttl(Duration::hours(24));

        store.login("admin", "right").await.unwrap();

        assert!(store.is_live());
        assert_eq!(store.current_identity().as_deref(), Some("admin"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));

        store.teardown();
        assert!(!store.is_live());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }
}
