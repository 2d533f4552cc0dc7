//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend address, request timeout, session freshness window, where the
//! session is persisted, and the last used username.
//!
//! Configuration is stored at `~/.config/docgate/config.json`. Values from
//! the environment (or a `.env` file) take precedence over the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::auth::SESSION_TTL_HOURS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "docgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Longest accepted freshness window (one year)
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

const ENV_API_URL: &str = "DOCGATE_API_URL";
const ENV_TIMEOUT_SECS: &str = "DOCGATE_TIMEOUT_SECS";
const ENV_SESSION_TTL_HOURS: &str = "DOCGATE_SESSION_TTL_HOURS";
const ENV_STORAGE: &str = "DOCGATE_STORAGE";

/// Where the session credential is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("Unknown storage backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub session_ttl_hours: i64,
    pub storage: StorageBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            session_ttl_hours: SESSION_TTL_HOURS,
            storage: StorageBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file, then apply `.env` and environment overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Self =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_TIMEOUT_SECS, secs))?;
        }
        if let Some(hours) = lookup(ENV_SESSION_TTL_HOURS) {
            self.session_ttl_hours = hours
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_SESSION_TTL_HOURS, hours))?;
        }
        if let Some(storage) = lookup(ENV_STORAGE) {
            self.storage = storage.parse()?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            bail!("api_base_url must not be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be positive");
        }
        if self.session_ttl_hours <= 0 || self.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            bail!(
                "session_ttl_hours must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            );
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// Freshness window; fails for values `validate` would reject.
    pub fn session_ttl(&self) -> Result<chrono::Duration> {
        match chrono::Duration::try_hours(self.session_ttl_hours) {
            Some(ttl) if (1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) => Ok(ttl),
            _ => bail!("session_ttl_hours out of range: {}", self.session_ttl_hours),
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session
    pub fn session_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
