//! Admin authentication.
//!
//! - Password hashing and verification with Argon2id
//! - Login attempt rate limiting over an injected store

mod password;
mod rate_limit;

pub use password::{AdminCredential, PasswordError, hash_password, verify_password};
pub use rate_limit::{
    AttemptRecord, AttemptStore, InMemoryAttemptStore, LoginRateLimiter, RateLimitError,
    RateLimitPolicy,
};
