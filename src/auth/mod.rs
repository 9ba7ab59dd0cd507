//! Authentication and authorization.
//!
//! [`Auth`] wraps an [`AccountStore`] together with the default account
//! handed to requests that carry no valid credentials. Path permissions
//! live on [`Account`] itself (see [`acl`]).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::store::{AccountStore, StoreError};

pub mod account;
pub mod acl;
pub mod password;

pub use account::{Account, AccountError};

/// Credential check failure. Unknown user and wrong password are the same
/// error so callers cannot probe for account names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Failed to authenticate")]
    InvalidCredentials,
}

/// Account lookup and credential verification over a store.
#[derive(Clone)]
pub struct Auth {
    store: Arc<dyn AccountStore>,
    default_account: Account,
}

impl Auth {
    /// Create an `Auth` over `store` with `default_account` for anonymous
    /// requests.
    pub fn new(store: Arc<dyn AccountStore>, default_account: Account) -> Self {
        Self {
            store,
            default_account,
        }
    }

    /// Create an `Auth` whose default account has no permissions.
    pub fn from_store(store: Arc<dyn AccountStore>) -> Self {
        Self::new(store, Account::default())
    }

    /// The account used when no valid credentials are presented.
    pub fn get_default(&self) -> Account {
        self.default_account.clone()
    }

    /// Return the account for `username` if `password` verifies.
    pub fn get_account(&self, username: &str, password: &[u8]) -> Result<Account, AuthError> {
        match self.store.get(username) {
            Some(account) if account.check_password(password) => Ok(account),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Look up an account without checking any password.
    ///
    /// For administrative tooling only; no authorization is performed.
    pub fn view_account(&self, username: &str) -> Option<Account> {
        self.store.get(username)
    }

    /// Insert or replace `account` and write the store back.
    ///
    /// If saving fails the account stays in memory and the error is
    /// returned; memory and disk then differ until the next save.
    pub fn add_user(&self, account: Account) -> Result<(), StoreError> {
        let username = account.user.clone();
        self.store.set(&username, account);
        self.store.save()
    }

    /// Remove `username` and write the store back.
    ///
    /// Same divergence caveat as [`Auth::add_user`].
    pub fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        self.store.delete(username);
        self.store.save()
    }
}

// ── Basic credentials ───────────────────────────────────────────────

/// Parse an `Authorization: Basic <base64(user:password)>` header value.
///
/// Returns `None` for other schemes, bad base64, non-UTF-8 usernames or a
/// missing `:` separator. The password is returned as raw bytes.
pub fn parse_basic_auth(header: &str) -> Option<(String, Vec<u8>)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let colon = decoded.iter().position(|b| *b == b':')?;
    let username = String::from_utf8(decoded[..colon].to_vec()).ok()?;
    let password = decoded[colon + 1..].to_vec();
    Some((username, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use tempfile::TempDir;

    fn nick() -> Account {
        let mut account = Account::new("nick");
        account.readable = vec!["/foo".to_string()];
        account.set_password("password").unwrap();
        account
    }

    fn test_auth() -> Auth {
        let store = MemoryStore::with_accounts([nick(), Account::new("guest")]);
        let anonymous = Account::anonymous(vec!["/public".to_string()], vec![]);
        Auth::new(Arc::new(store), anonymous)
    }

    #[test]
    fn test_get_account_with_correct_password() {
        let auth = test_auth();
        let account = auth.get_account("nick", b"password").unwrap();
        assert_eq!(account.user, "nick");
        assert!(account.can_read("/foo/bar"));
    }

    #[test]
    fn test_get_account_failures_are_indistinguishable() {
        let auth = test_auth();
        let wrong_password = auth.get_account("nick", b"admin").unwrap_err();
        let unknown_user = auth.get_account("zach", b"password").unwrap_err();
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(wrong_password.to_string(), "Failed to authenticate");
    }

    #[test]
    fn test_password_less_account_accepts_anything() {
        let auth = test_auth();
        assert!(auth.get_account("guest", b"").is_ok());
        assert!(auth.get_account("guest", b"anything").is_ok());
    }

    #[test]
    fn test_get_default() {
        let auth = test_auth();
        let default = auth.get_default();
        assert!(default.can_read("/public/readme.txt"));
        assert!(!default.can_read("/foo"));

        let bare = Auth::from_store(Arc::new(MemoryStore::new()));
        assert!(!bare.get_default().can_read("/"));
    }

    #[test]
    fn test_view_account_skips_password() {
        let auth = test_auth();
        assert_eq!(auth.view_account("nick").unwrap().user, "nick");
        assert!(auth.view_account("zach").is_none());
    }

    #[test]
    fn test_add_and_delete_user_persist() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("accounts.json");
        let auth = Auth::from_store(Arc::new(FileStore::empty(&path)));

        auth.add_user(nick()).unwrap();
        let on_disk = FileStore::open(&path).unwrap();
        assert!(on_disk.get("nick").is_some());

        auth.delete_user("nick").unwrap();
        let on_disk = FileStore::open(&path).unwrap();
        assert!(on_disk.get("nick").is_none());
    }

    #[test]
    fn test_add_user_keeps_memory_when_save_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing-dir").join("accounts.json");
        let auth = Auth::from_store(Arc::new(FileStore::empty(path)));

        assert!(auth.add_user(nick()).is_err());
        assert!(auth.view_account("nick").is_some());
    }

    #[test]
    fn test_parse_basic_auth() {
        // "nick:password"
        assert_eq!(
            parse_basic_auth("Basic bmljazpwYXNzd29yZA=="),
            Some(("nick".to_string(), b"password".to_vec()))
        );
        // Scheme is case-insensitive; password may contain ':'. "a:b:c"
        assert_eq!(
            parse_basic_auth("basic YTpiOmM="),
            Some(("a".to_string(), b"b:c".to_vec()))
        );
        // "nick:" -> empty password
        assert_eq!(
            parse_basic_auth("Basic bmljazo="),
            Some(("nick".to_string(), Vec::new()))
        );
    }

    #[test]
    fn test_parse_basic_auth_rejects_malformed() {
        assert_eq!(parse_basic_auth("Bearer abc"), None);
        assert_eq!(parse_basic_auth("Basic !!!"), None);
        // "nocolon"
        assert_eq!(parse_basic_auth("Basic bm9jb2xvbg=="), None);
        assert_eq!(parse_basic_auth("Basic"), None);
        assert_eq!(parse_basic_auth(""), None);
    }
}
