//! JSON file account store.
//!
//! The backing file is a single JSON array of accounts. Loading replaces
//! the in-memory mapping wholesale and leaves it untouched on failure.
//! Saving rewrites the whole file: temp file in the same directory, then
//! an atomic rename over the original.
//!
//! [`FileStore::spawn_watcher`] starts the reload loop, which polls the
//! file's contents. The store keeps a SHA-256 fingerprint of the bytes it
//! last loaded or saved, so the loop reloads on any content change (even a
//! same-length rewrite within one timestamp tick) and skips the store's own
//! saves. Permission-only changes leave the contents untouched, so they
//! never trigger a reload.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{AccountStore, StoreError};
use crate::auth::account::Account;

/// Account store backed by a JSON file on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    accounts: RwLock<HashMap<String, Account>>,
    /// Fingerprint of the backing file as last loaded or saved.
    synced: Mutex<Option<Fingerprint>>,
}

type Fingerprint = [u8; 32];

impl FileStore {
    /// Create an empty store that will save to `path`. Nothing is read.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            accounts: RwLock::new(HashMap::new()),
            synced: Mutex::new(None),
        }
    }

    /// Create a store from the accounts already saved at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::empty(path);
        let count = store.load_from(&store.path)?;
        debug!("Loaded {} accounts from {}", count, store.path.display());
        Ok(store)
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the mapping with the accounts in `path`.
    ///
    /// Returns the number of accounts loaded. If the file is missing,
    /// unreadable or malformed the current mapping is kept.
    pub fn load_from(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| StoreError::Io {
            op: "read",
            path: path.to_path_buf(),
            source,
        })?;
        self.replace(path, &data)
    }

    fn replace(&self, path: &Path, data: &[u8]) -> Result<usize, StoreError> {
        let loaded = parse_accounts(path, data)?;
        let count = loaded.len();
        {
            let mut accounts = self.accounts.write().expect("rwlock poisoned");
            *accounts = loaded;
        }
        if path == self.path.as_path() {
            self.mark_synced(fingerprint(data));
        }
        Ok(count)
    }

    fn synced(&self) -> Option<Fingerprint> {
        *self.synced.lock().expect("mutex poisoned")
    }

    fn mark_synced(&self, print: Fingerprint) {
        *self.synced.lock().expect("mutex poisoned") = Some(print);
    }

    /// Snapshot of every account, ordered by username.
    pub fn accounts(&self) -> Vec<Account> {
        let accounts = self.accounts.read().expect("rwlock poisoned");
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.user.cmp(&b.user));
        all
    }

    /// Start the reload loop on the tokio runtime.
    ///
    /// The task reads the backing file every `interval` and reloads it when
    /// its contents differ from what the store last loaded or saved. The
    /// comparison starts from the load done by [`FileStore::open`], so edits
    /// made before the watcher starts are picked up on the first tick.
    /// Reload failures are logged and the previous accounts stay in effect.
    /// The task runs until the runtime shuts down.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move { store.watch(interval).await })
    }

    async fn watch(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seen = self.synced();
        let mut readable = true;
        info!("Watching accounts file {}", self.path.display());

        loop {
            ticker.tick().await;
            let data = match tokio::fs::read(&self.path).await {
                Ok(data) => data,
                Err(e) => {
                    if readable {
                        warn!(
                            "Accounts file {} is no longer readable, keeping the last loaded accounts: {}",
                            self.path.display(),
                            e
                        );
                    }
                    readable = false;
                    seen = None;
                    continue;
                }
            };
            readable = true;

            let current = fingerprint(&data);
            if seen == Some(current) {
                continue;
            }
            seen = Some(current);
            if self.synced() == Some(current) {
                // Our own save, or a rewrite with identical contents.
                continue;
            }

            match self.replace(&self.path, &data) {
                Ok(count) => info!(
                    "Accounts file {} has been updated ({} accounts)",
                    self.path.display(),
                    count
                ),
                Err(e) => warn!("Error reloading accounts, auth may be out of date: {}", e),
            }
        }
    }
}

impl AccountStore for FileStore {
    fn get(&self, username: &str) -> Option<Account> {
        let accounts = self.accounts.read().expect("rwlock poisoned");
        accounts.get(username).cloned()
    }

    fn set(&self, username: &str, account: Account) {
        let mut accounts = self.accounts.write().expect("rwlock poisoned");
        accounts.insert(username.to_string(), account);
    }

    fn delete(&self, username: &str) {
        let mut accounts = self.accounts.write().expect("rwlock poisoned");
        accounts.remove(username);
    }

    fn save(&self) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(&self.accounts())?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |op: &'static str| {
            let path = self.path.clone();
            move |source: std::io::Error| StoreError::Io { op, path, source }
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(io_err("create"))?;
        temp.write_all(&data).map_err(io_err("write"))?;
        temp.as_file().sync_all().map_err(io_err("sync"))?;
        temp.persist(&self.path).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })?;
        self.mark_synced(fingerprint(&data));
        Ok(())
    }
}

fn parse_accounts(path: &Path, data: &[u8]) -> Result<HashMap<String, Account>, StoreError> {
    // A store saved with no accounts may be written as `null`.
    let list: Option<Vec<Account>> =
        serde_json::from_slice(data).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(list
        .unwrap_or_default()
        .into_iter()
        .map(|account| (account.user.clone(), account))
        .collect())
}

fn fingerprint(data: &[u8]) -> Fingerprint {
    Sha256::digest(data).into()
}
