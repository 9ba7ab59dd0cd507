//! Account records.
//!
//! An [`Account`] is a username, two permission lists and a password hash.
//! The serialized field names (`User`, `Readable`, `Writeable`, `Hash`) are
//! the on-disk format of the accounts file.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::acl::can_access;
use super::password::{hash_password, verify_password};

/// Errors raised while editing an account.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The password could not be hashed.
    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// A named identity with read/write permission patterns.
///
/// An empty `hash` means the account has no password and accepts any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Username; the key in the accounts store.
    #[serde(rename = "User")]
    pub user: String,
    /// Glob patterns the account may read.
    #[serde(rename = "Readable", default, deserialize_with = "null_as_empty")]
    pub readable: Vec<String>,
    /// Glob patterns the account may write.
    #[serde(rename = "Writeable", default, deserialize_with = "null_as_empty")]
    pub writeable: Vec<String>,
    /// Password hash (PHC string), or empty for password-less.
    #[serde(rename = "Hash", default)]
    pub hash: String,
}

/// Older accounts files write `null` for empty permission lists.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Account {
    /// Create an account with no permissions and no password.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Create a password-less account with the given permissions.
    pub fn anonymous(readable: Vec<String>, writeable: Vec<String>) -> Self {
        Self {
            user: String::new(),
            readable,
            writeable,
            hash: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.user
    }

    /// True if the account may read `path`.
    pub fn can_read(&self, path: &str) -> bool {
        can_access(&self.readable, path)
    }

    /// True if the account may write `path`.
    pub fn can_write(&self, path: &str) -> bool {
        can_access(&self.writeable, path)
    }

    /// Check a plaintext password. Always true when the account has no hash.
    pub fn check_password(&self, password: &[u8]) -> bool {
        if self.hash.is_empty() {
            return true;
        }
        verify_password(password, &self.hash)
    }

    /// Replace the stored hash with a fresh hash of `password`.
    pub fn set_password(&mut self, password: &str) -> Result<(), AccountError> {
        self.hash = hash_password(password)?;
        Ok(())
    }

    /// Grant read access to `pattern`. Returns false if it was already granted.
    pub fn add_readable(&mut self, pattern: &str) -> bool {
        add_pattern(&mut self.readable, pattern)
    }

    /// Grant write access to `pattern`. Returns false if it was already granted.
    pub fn add_writeable(&mut self, pattern: &str) -> bool {
        add_pattern(&mut self.writeable, pattern)
    }

    /// Revoke read access to `pattern`. Returns false if it was not granted.
    pub fn remove_readable(&mut self, pattern: &str) -> bool {
        remove_pattern(&mut self.readable, pattern)
    }

    /// Revoke write access to `pattern`. Returns false if it was not granted.
    pub fn remove_writeable(&mut self, pattern: &str) -> bool {
        remove_pattern(&mut self.writeable, pattern)
    }
}

fn add_pattern(list: &mut Vec<String>, pattern: &str) -> bool {
    if list.iter().any(|p| p == pattern) {
        return false;
    }
    list.push(pattern.to_string());
    true
}

fn remove_pattern(list: &mut Vec<String>, pattern: &str) -> bool {
    let before = list.len();
    list.retain(|p| p != pattern);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(readable: &[&str]) -> Account {
        Account {
            user: "nick".to_string(),
            readable: readable.iter().map(|s| s.to_string()).collect(),
            writeable: vec![],
            hash: String::new(),
        }
    }

    #[test]
    fn test_name() {
        assert_eq!(Account::new("admin").name(), "admin");
    }

    #[test]
    fn test_can_read_and_write_use_separate_lists() {
        let mut account = reader(&["/foo", "/bar/baz"]);
        account.writeable = vec!["/foo/uploads".to_string()];

        assert!(account.can_read("/foo/yarr/pop"));
        assert!(account.can_read("/bar/baz/"));
        assert!(!account.can_read("gibberish"));
        assert!(!account.can_read("/"));

        assert!(account.can_write("/foo/uploads/a.bin"));
        assert!(!account.can_write("/foo/a.bin"));
    }

    #[test]
    fn test_root_pattern_reads_everything() {
        assert!(reader(&["/"]).can_read("/bar/baz"));
    }

    #[test]
    fn test_empty_hash_accepts_any_password() {
        let account = Account::new("anon");
        assert!(account.check_password(b""));
        assert!(account.check_password(b"whatever"));
    }

    #[test]
    fn test_check_password_against_hash() {
        let mut account = Account::new("nick");
        account.set_password("password").expect("hash");

        for _ in 0..3 {
            assert!(account.check_password(b"password"));
            assert!(!account.check_password(b"Password"));
            assert!(!account.check_password(b"admin"));
        }
    }

    #[test]
    fn test_add_and_remove_patterns() {
        let mut account = reader(&["/a", "/b", "/c"]);
        assert!(!account.add_readable("/a"));
        assert!(account.add_readable("/d"));
        assert!(account.remove_readable("/b"));
        assert!(!account.remove_readable("/b"));
        assert_eq!(account.readable, vec!["/a", "/c", "/d"]);

        assert!(account.add_writeable("/w"));
        assert!(!account.add_writeable("/w"));
        assert!(account.remove_writeable("/w"));
        assert!(account.writeable.is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let account = reader(&["/foo"]);
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["User"], "nick");
        assert_eq!(json["Readable"][0], "/foo");
        assert_eq!(json["Writeable"], serde_json::json!([]));
        assert_eq!(json["Hash"], "");
    }

    #[test]
    fn test_null_permission_lists_deserialize_as_empty() {
        let json = r#"{"User":"zach","Readable":null,"Writeable":null,"Hash":""}"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account, Account::new("zach"));
    }

    #[test]
    fn test_bcrypt_account_from_existing_file() {
        let json = r#"{
            "User": "nick",
            "Readable": ["/foo"],
            "Writeable": [],
            "Hash": "$2y$12$md1lRePghQ.oawY0RXtfvuQjQ4ejPQxZekGmy6Gki/LAs4sylHwHq"
        }"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert!(account.check_password(b"password"));
        assert!(!account.check_password(b"admin"));
    }
}
