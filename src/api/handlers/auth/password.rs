//! Argon2id password hashing.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

/// Hash a password into a PHC string for storage.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a candidate password against a stored PHC string.
///
/// A malformed stored hash counts as a mismatch rather than an error so the
/// login path stays generic about why a credential failed.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("secret123").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret123", &hash));
        assert!(!verify_password("secret124", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("secret123").expect("hash");
        let second = hash_password("secret123").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_password("secret123", "not-a-phc-string"));
    }
}
