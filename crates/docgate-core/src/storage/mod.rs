//! Persistence for the session credential.
//!
//! The session store only needs a tiny string key-value capability
//! (`SessionStorage`). Three backends are provided:
//! - `MemoryStorage`: process-local, for tests and throwaway sessions
//! - `FileStorage`: a JSON object in the user's cache directory
//! - `KeyringStorage`: OS-level keychain entries via keyring

pub mod file;
pub mod keychain;
pub mod memory;

use anyhow::Result;

pub use self::file::FileStorage;
pub use self::keychain::KeyringStorage;
pub use self::memory::MemoryStorage;

/// String key-value store that survives restarts (or not, for `MemoryStorage`).
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}
