//! Admin password hashing and verification with Argon2id.
//!
//! The admin password is never stored; configuration holds its PHC hash,
//! produced by `hirebill hash-password`.

use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Errors that can occur during password operations.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Failed to hash password.
    #[error("failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password.
    #[error("failed to verify password: {0}")]
    VerifyError(String),

    /// Configured hash is not a PHC string.
    #[error("invalid password hash format")]
    InvalidHash,

    /// Password is empty.
    #[error("password must not be empty")]
    EmptyPassword,
}

/// Hashes a password using Argon2id.
///
/// # Errors
///
/// Returns `PasswordError::EmptyPassword` for an empty password, or
/// `PasswordError::HashError` if hashing fails.
///
/// # Example
///
/// ```
/// use hirebill_core::auth::hash_password;
///
/// let hash = hash_password("correct horse").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::EmptyPassword);
    }
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Verifies a password against a PHC hash.
///
/// # Errors
///
/// Returns `PasswordError::InvalidHash` if the hash cannot be parsed, or
/// `PasswordError::VerifyError` if verification fails for a reason other
/// than a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// The configured admin credential.
#[derive(Clone)]
pub struct AdminCredential {
    hash: String,
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential").finish_non_exhaustive()
    }
}

impl AdminCredential {
    /// Wraps a configured PHC hash.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::InvalidHash` if the hash cannot be parsed, so
    /// a misconfigured server fails at startup rather than on first login.
    pub fn from_hash(hash: impl Into<String>) -> Result<Self, PasswordError> {
        let hash = hash.into();
        PasswordHash::new(&hash).map_err(|_| PasswordError::InvalidHash)?;
        Ok(Self { hash })
    }

    /// Checks a login attempt. Empty passwords never match.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::VerifyError` on an unexpected verifier failure.
    pub fn verify(&self, password: &str) -> Result<bool, PasswordError> {
        if password.is_empty() {
            return Ok(false);
        }
        verify_password(password, &self.hash)
    }
}
