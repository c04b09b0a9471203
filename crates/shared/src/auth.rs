//! Authentication types for admin sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject recorded in every admin session token.
pub const ADMIN_SUBJECT: &str = "admin";

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (always the admin principal).
    pub sub: String,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
}

impl Claims {
    /// Creates new admin claims expiring at `expires_at`.
    #[must_use]
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            sub: ADMIN_SUBJECT.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns true if the claims belong to the admin principal.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.sub == ADMIN_SUBJECT
    }
}

/// Login request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Admin password.
    pub password: String,
}

/// Login response payload.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    /// Bearer session token.
    pub token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
}
