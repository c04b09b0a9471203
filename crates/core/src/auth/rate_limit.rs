//! Login attempt rate limiting.
//!
//! Failed logins are counted per source key (normally the client IP) over a
//! sliding window. Reaching the limit locks the key out for a fixed period.
//! State lives behind [`AttemptStore`] so the limiter's lifecycle is owned
//! by whoever builds it; the in-memory store resets on restart and is
//! advisory only.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use hirebill_shared::config::AuthConfig;

/// Rate limiter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The key is locked out.
    #[error("Too many failed login attempts; retry in {retry_after_secs}s")]
    Locked {
        /// Seconds until the lockout ends.
        retry_after_secs: i64,
    },

    /// The backing store failed.
    #[error("Attempt store error: {0}")]
    Store(String),
}

impl RateLimitError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Locked { .. } => "TOO_MANY_REQUESTS",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Locked { .. } => 429,
            Self::Store(_) => 500,
        }
    }
}

/// Failures recorded for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Failure times inside the current window.
    pub failures: Vec<DateTime<Utc>>,
    /// End of the current lockout.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Storage for attempt records.
///
/// A single-instance deployment uses [`InMemoryAttemptStore`]; several
/// instances need a shared cache behind the same interface.
pub trait AttemptStore: Send + Sync {
    /// Loads the record for a key.
    fn load(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<AttemptRecord>, RateLimitError>> + Send;

    /// Saves the record for a key.
    fn save(
        &self,
        key: &str,
        record: AttemptRecord,
    ) -> impl std::future::Future<Output = Result<(), RateLimitError>> + Send;

    /// Forgets a key.
    fn clear(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RateLimitError>> + Send;
}

/// In-memory attempt store with a cap on tracked keys.
pub struct InMemoryAttemptStore {
    records: DashMap<String, AttemptRecord>,
    max_tracked_keys: usize,
}

impl Default for InMemoryAttemptStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemoryAttemptStore {
    /// Creates a store tracking at most `max_tracked_keys` keys.
    #[must_use]
    pub fn new(max_tracked_keys: usize) -> Self {
        Self {
            records: DashMap::new(),
            max_tracked_keys,
        }
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AttemptStore for InMemoryAttemptStore {
    async fn load(&self, key: &str) -> Result<Option<AttemptRecord>, RateLimitError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn save(&self, key: &str, record: AttemptRecord) -> Result<(), RateLimitError> {
        if !self.records.contains_key(key) && self.records.len() >= self.max_tracked_keys {
            // Oldest activity goes first.
            let oldest = self
                .records
                .iter()
                .min_by_key(|entry| entry.value().failures.last().copied())
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                debug!(tracked = self.records.len(), "evicting oldest login attempt record");
                self.records.remove(&oldest);
            }
        }
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), RateLimitError> {
        self.records.remove(key);
        Ok(())
    }
}

/// Limits and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Failures allowed inside the window before lockout.
    pub max_attempts: u32,
    /// Sliding window length.
    pub window: Duration,
    /// Lockout length.
    pub lockout: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            lockout: Duration::minutes(15),
        }
    }
}

impl From<&AuthConfig> for RateLimitPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            window: seconds(config.attempt_window_secs),
            lockout: seconds(config.lockout_secs),
        }
    }
}

fn seconds(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Sliding-window login limiter.
pub struct LoginRateLimiter<S: AttemptStore> {
    store: Arc<S>,
    policy: RateLimitPolicy,
}

impl<S: AttemptStore> Clone for LoginRateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
        }
    }
}

impl<S: AttemptStore> LoginRateLimiter<S> {
    /// Creates a limiter over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// Rejects the attempt if `key` is locked out.
    pub async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        let Some(record) = self.store.load(key).await? else {
            return Ok(());
        };
        match record.locked_until {
            Some(until) if until > now => Err(RateLimitError::Locked {
                retry_after_secs: (until - now).num_seconds().max(1),
            }),
            _ => Ok(()),
        }
    }

    /// Records a failed attempt and returns the attempts left before lockout.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Locked` when this failure triggers a lockout.
    pub async fn record_failure(&self, key: &str, now: DateTime<Utc>) -> Result<u32, RateLimitError> {
        let mut record = self.store.load(key).await?.unwrap_or_default();
        let cutoff = now
            .checked_sub_signed(self.policy.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        record.failures.retain(|t| *t > cutoff);
        if record.locked_until.is_some_and(|until| until <= now) {
            record.locked_until = None;
        }
        record.failures.push(now);

        let failures = u32::try_from(record.failures.len()).unwrap_or(u32::MAX);
        if failures >= self.policy.max_attempts {
            let until = now
                .checked_add_signed(self.policy.lockout)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            warn!(key, failures, locked_until = %until, "login locked out");
            record.failures.clear();
            record.locked_until = Some(until);
            self.store.save(key, record).await?;
            return Err(RateLimitError::Locked {
                retry_after_secs: self.policy.lockout.num_seconds(),
            });
        }

        self.store.save(key, record).await?;
        Ok(self.policy.max_attempts - failures)
    }

    /// Clears the key after a successful login.
    pub async fn record_success(&self, key: &str) -> Result<(), RateLimitError> {
        self.store.clear(key).await
    }
}
