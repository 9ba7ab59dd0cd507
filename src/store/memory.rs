//! In-memory account store.
//!
//! Holds accounts in a `RwLock<HashMap>` with no persistence. Useful for
//! testing and ephemeral deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{AccountStore, StoreError};
use crate::auth::account::Account;

#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `accounts`, keyed by their username.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.user.clone(), account))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
        }
    }
}

impl AccountStore for MemoryStore {
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
        Ok(())
    }
}
