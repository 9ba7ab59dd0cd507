//! Password hashing.
//!
//! New hashes are Argon2id PHC strings with a random per-password salt.
//! Accounts files written by older tooling hold bcrypt hashes (`$2a$`,
//! `$2b$`, `$2x$`, `$2y$`); those still verify, through `bcrypt`.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use tracing::trace;

use super::account::AccountError;

/// Hash `password` with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AccountError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored Argon2 or bcrypt hash.
///
/// A hash that cannot be parsed never verifies.
pub fn verify_password(password: &[u8], password_hash: &str) -> bool {
    if is_bcrypt(password_hash) {
        return match bcrypt::verify(password, password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                trace!("Unparsable stored bcrypt hash: {}", e);
                false
            }
        };
    }

    let parsed = match PasswordHash::new(password_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            trace!("Unparsable stored password hash: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password, &parsed)
        .is_ok()
}

fn is_bcrypt(password_hash: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| password_hash.starts_with(prefix))
}
