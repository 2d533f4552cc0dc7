//! Wiring for one client session: config, transport, storage, session and gate.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{info, warn};

use crate::api::{GateError, HttpTransport, Transport};
use crate::auth::{Credential, SessionStore};
use crate::config::{Config, StorageBackend};
use crate::gate::AccessGate;
use crate::storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage};

/// A single logical session and the gate in front of it.
pub struct GateContext {
    session: Arc<SessionStore>,
    gate: Arc<AccessGate>,
}

impl GateContext {
    /// Build the reqwest transport and storage backend named by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let ttl = config.session_ttl()?;
        let transport = HttpTransport::with_timeout(&config.api_base_url, config.request_timeout())
            .context("Failed to build HTTP client")?;
        let storage = open_storage(config)?;
        info!(
            api = %config.api_base_url,
            storage = ?config.storage,
            "Gate context ready"
        );
        Ok(Self::new(storage, Arc::new(transport), ttl))
    }

    pub fn new(
        storage: Arc<dyn SessionStorage>,
        transport: Arc<dyn Transport>,
        ttl: Duration,
    ) -> Self {
        let session = Arc::new(SessionStore::new(storage, Arc::clone(&transport)).with_ttl(ttl));
        let gate = Arc::new(AccessGate::new(Arc::clone(&session), transport));
        Self { session, gate }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn gate(&self) -> &Arc<AccessGate> {
        &self.gate
    }

    /// Log in and load the new session's permissions.
    ///
    /// A failed permission load does not undo the login; the gate simply
    /// keeps denying until `AccessGate::load_permissions` succeeds.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, GateError> {
        let credential = self.session.login(username, password).await?;
        if !self.gate.initialize().await {
            warn!(username = username, "Logged in without permissions");
        }
        Ok(credential)
    }

    pub fn logout(&self) {
        self.gate.logout();
    }
}

/// Open the session storage backend selected in `config`.
pub fn open_storage(config: &Config) -> Result<Arc<dyn SessionStorage>> {
    Ok(match config.storage {
        StorageBackend::File => Arc::new(FileStorage::new(config.session_dir()?)),
        StorageBackend::Keyring => Arc::new(KeyringStorage::new()),
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedTransport;

    #[test]
    fn test_from_config_with_memory_storage() {
        let config = Config {
            storage: StorageBackend::Memory,
            ..Config::default()
        };
        let context = GateContext::from_config(&config).unwrap();
        assert!(!context.session().is_live());
        assert_eq!(context.session().ttl(), Duration::hours(24));
    }

    #[tokio::test]
    async fn test_login_loads_permissions() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, serde_json::json!({"token": "abc"}));
        transport.push_json(200, serde_json::json!({"permissions": ["MANAGE_USERS"]}));
        let context = GateContext::new(
            Arc::new(MemoryStorage::new()),
            transport.clone(),
            Duration::hours(24),
        );

        context.login("admin", "right").await.unwrap();
        assert!(context.gate().can_manage_users());
        assert_eq!(transport.calls(), 2);

        context.logout();
        assert!(!context.session().is_live());
        assert!(!context.gate().can_manage_users());
    }

    #[tokio::test]
    async fn test_login_survives_permission_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, serde_json::json!({"token": "abc"}));
        transport.push_status(500);
        let context = GateContext::new(
            Arc::new(MemoryStorage::new()),
            transport,
            Duration::hours(24),
        );

        context.login("admin", "right").await.unwrap();
        assert!(context.session().is_live());
        assert!(!context.gate().permission_state().is_loaded());
    }
}
