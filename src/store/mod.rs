//! Account storage.
//!
//! The [`AccountStore`] trait is the only view the authorization layer has
//! of where accounts live. [`file::FileStore`] is the default
//! implementation, backed by a JSON file and optionally live-reloaded;
//! [`memory::MemoryStore`] keeps everything in memory.

use std::path::PathBuf;

use thiserror::Error;

use crate::auth::account::Account;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Concurrency-safe username -> account mapping.
///
/// `set` and `delete` only touch memory; `save` persists the whole
/// mapping. No atomicity is promised across separate calls.
pub trait AccountStore: Send + Sync + 'static {
    /// Look up an account by username.
    fn get(&self, username: &str) -> Option<Account>;

    /// Insert or replace the account stored under `username`.
    fn set(&self, username: &str, account: Account);

    /// Remove `username` if present.
    fn delete(&self, username: &str);

    /// Persist the current mapping.
    fn save(&self) -> Result<(), StoreError>;
}

/// Failures reading or writing the accounts file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {op} accounts file {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("accounts file {path} is not a valid account list: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize accounts: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to replace accounts file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}
