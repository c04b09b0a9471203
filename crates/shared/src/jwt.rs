//! Admin session token generation and validation.
//!
//! Tokens are HMAC-signed (HS256) JWTs with a fixed expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::auth::Claims;

/// Session token configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            ttl_secs: 43_200,
        }
    }
}

/// Errors that can occur during session token operations.
#[derive(Debug, Error)]
pub enum SessionTokenError {
    /// Token encoding failed.
    #[error("failed to encode token: {0}")]
    EncodingError(String),

    /// Token decoding failed.
    #[error("failed to decode token: {0}")]
    DecodingError(String),

    /// Token has expired.
    #[error("token has expired")]
    Expired,

    /// Token is well-formed but not an admin session.
    #[error("invalid token")]
    Invalid,
}

/// Session token service.
#[derive(Clone)]
pub struct SessionTokenService {
    config: SessionConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SessionTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenService")
            .field("ttl_secs", &self.config.ttl_secs)
            .field("encoding_key", &"[hidden]")
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl SessionTokenService {
    /// Creates a new session token service with the given configuration.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issues a session token for the admin principal.
    ///
    /// # Errors
    ///
    /// Returns `SessionTokenError::EncodingError` if token generation fails.
    pub fn issue(&self) -> Result<String, SessionTokenError> {
        let expires_at = Utc::now() + Duration::seconds(self.config.ttl_secs);
        let claims = Claims::new(expires_at);

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| SessionTokenError::EncodingError(e.to_string()))
    }

    /// Validates and decodes a token.
    ///
    /// # Errors
    ///
    /// Returns `SessionTokenError::Expired` if the token has expired.
    /// Returns `SessionTokenError::DecodingError` if the token is malformed or mis-signed.
    pub fn validate(&self, token: &str) -> Result<Claims, SessionTokenError> {
        let validation = Validation::default();

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionTokenError::Expired,
                _ => SessionTokenError::DecodingError(e.to_string()),
            })?;

        if !claims.is_admin() {
            return Err(SessionTokenError::Invalid);
        }
        Ok(claims)
    }

    /// Returns the token lifetime in seconds.
    #[must_use]
    pub const fn expires_in(&self) -> i64 {
        self.config.ttl_secs
    }
}
