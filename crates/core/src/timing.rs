//! Excess timing policy.
//!
//! Decides whether excess is collected as a hold or an upfront charge and
//! whether collection is allowed right now. A pure function of the clock,
//! the hire window and whether any excess-bearing vehicle is on the job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hirebill_shared::config::BillingConfig;

/// Timing policy errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingError {
    /// Vehicles are on hire but the job has no hire dates.
    #[error("Job has vehicles on hire but no hire start/end dates")]
    MissingHireDates,

    /// Hire end precedes hire start.
    #[error("Hire ends ({end}) before it starts ({start})")]
    InvalidWindow {
        /// Hire start.
        start: DateTime<Utc>,
        /// Hire end.
        end: DateTime<Utc>,
    },

    /// The requested collection is not allowed in the current state.
    #[error("Excess collection by {method} is not allowed while {state}")]
    CollectionNotAllowed {
        /// Current timing state.
        state: ExcessTimingState,
        /// Requested method.
        method: CollectionMethod,
    },
}

impl TimingError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingHireDates => "MISSING_HIRE_DATES",
            Self::InvalidWindow { .. } => "INVALID_HIRE_WINDOW",
            Self::CollectionNotAllowed { .. } => "EXCESS_COLLECTION_NOT_ALLOWED",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::MissingHireDates
            | Self::InvalidWindow { .. }
            | Self::CollectionNotAllowed { .. } => 422,
        }
    }
}

/// Excess collection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExcessTimingState {
    /// No excess-bearing vehicle on the job.
    NotRequired,
    /// Hold window has not opened yet.
    TooEarly,
    /// Inside the hold window.
    HoldAvailable,
    /// Hold window has closed; fall back to an upfront charge.
    TooLate,
    /// Hire too long for a hold; charge upfront, refund after the hire.
    UpfrontPaymentRequired,
}

impl std::fmt::Display for ExcessTimingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRequired => write!(f, "NOT_REQUIRED"),
            Self::TooEarly => write!(f, "TOO_EARLY"),
            Self::HoldAvailable => write!(f, "HOLD_AVAILABLE"),
            Self::TooLate => write!(f, "TOO_LATE"),
            Self::UpfrontPaymentRequired => write!(f, "UPFRONT_PAYMENT_REQUIRED"),
        }
    }
}

/// How excess is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    /// Manual-capture hold.
    Hold,
    /// Immediate charge.
    Upfront,
}

impl std::fmt::Display for CollectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold => write!(f, "hold"),
            Self::Upfront => write!(f, "upfront charge"),
        }
    }
}

/// Hire start and end, validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl HireWindow {
    /// Creates a window.
    ///
    /// # Errors
    ///
    /// Returns `TimingError::InvalidWindow` if `end` precedes `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimingError> {
        if end < start {
            return Err(TimingError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Hire start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Hire end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Hire length in days, part days rounded up, at least one.
    #[must_use]
    pub fn hire_days(&self) -> i64 {
        let seconds = (self.end - self.start).num_seconds();
        let days = seconds / 86_400 + i64::from(seconds % 86_400 != 0);
        days.max(1)
    }
}

/// Window parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingPolicy {
    /// Longest hire that can be covered by a hold.
    pub max_hold_hire_days: i64,
    /// How long before hire start the hold window opens.
    pub open_before_start: Duration,
    /// How long after hire end the hold window closes.
    pub close_after_end: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for TimingPolicy {
    fn from(config: &BillingConfig) -> Self {
        Self {
            max_hold_hire_days: config.max_hold_hire_days,
            open_before_start: Duration::hours(config.hold_window_open_hours),
            close_after_end: Duration::hours(config.hold_window_close_hours),
        }
    }
}

/// Outcome of a timing evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingDecision {
    /// Current state.
    pub state: ExcessTimingState,
    /// Hire length in days, if dates are known.
    pub hire_days: Option<i64>,
    /// When the hold window opens.
    pub window_opens_at: Option<DateTime<Utc>>,
    /// When the hold window closes.
    pub window_closes_at: Option<DateTime<Utc>>,
    /// Collection method for this job, if excess is required.
    pub collection_method: Option<CollectionMethod>,
    /// Whether collection may happen now.
    pub collection_allowed: bool,
}

impl TimingDecision {
    fn not_required() -> Self {
        Self {
            state: ExcessTimingState::NotRequired,
            hire_days: None,
            window_opens_at: None,
            window_closes_at: None,
            collection_method: None,
            collection_allowed: false,
        }
    }

    /// Checks that excess may be collected by `method` now.
    ///
    /// # Errors
    ///
    /// Returns `TimingError::CollectionNotAllowed` otherwise.
    pub fn ensure_allows(&self, method: CollectionMethod) -> Result<(), TimingError> {
        let allowed = match method {
            CollectionMethod::Hold => self.state == ExcessTimingState::HoldAvailable,
            CollectionMethod::Upfront => matches!(
                self.state,
                ExcessTimingState::UpfrontPaymentRequired | ExcessTimingState::TooLate
            ),
        };
        if allowed {
            Ok(())
        } else {
            Err(TimingError::CollectionNotAllowed {
                state: self.state,
                method,
            })
        }
    }
}

impl TimingPolicy {
    /// Evaluates the timing state at `now`.
    ///
    /// # Errors
    ///
    /// Returns `TimingError::MissingHireDates` if vehicles are present but
    /// the job has no hire window.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        window: Option<HireWindow>,
        vehicles_present: bool,
    ) -> Result<TimingDecision, TimingError> {
        if !vehicles_present {
            return Ok(TimingDecision::not_required());
        }
        let window = window.ok_or(TimingError::MissingHireDates)?;

        let hire_days = window.hire_days();
        let opens = window.start() - self.open_before_start;
        let closes = window.end() + self.close_after_end;

        let (state, method) = if hire_days > self.max_hold_hire_days {
            (
                ExcessTimingState::UpfrontPaymentRequired,
                CollectionMethod::Upfront,
            )
        } else if now < opens {
            (ExcessTimingState::TooEarly, CollectionMethod::Hold)
        } else if now > closes {
            (ExcessTimingState::TooLate, CollectionMethod::Upfront)
        } else {
            (ExcessTimingState::HoldAvailable, CollectionMethod::Hold)
        };

        Ok(TimingDecision {
            state,
            hire_days: Some(hire_days),
            window_opens_at: Some(opens),
            window_closes_at: Some(closes),
            collection_method: Some(method),
            collection_allowed: state != ExcessTimingState::TooEarly,
        })
    }
}
