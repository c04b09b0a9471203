//! Excess holds (pre-authorizations) and their state machine.
//!
//! ```text
//! PENDING -> CREATED -> CAPTURED | RELEASED | EXPIRED
//! ```
//!
//! `CAPTURED`, `RELEASED` and `EXPIRED` are terminal.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hirebill_shared::types::{HoldId, JobId};

/// Hold errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HoldError {
    /// Capture amount must be positive.
    #[error("Capture amount must be greater than zero, got {0}")]
    InvalidAmount(Decimal),

    /// Capture amount exceeds what was authorized.
    #[error("Capture amount {requested} exceeds authorized amount {authorized}")]
    ExceedsAuthorized {
        /// Requested capture amount.
        requested: Decimal,
        /// Originally authorized amount.
        authorized: Decimal,
    },

    /// Hold is not in a capturable state.
    #[error("Hold {hold_id} cannot be captured in status {status}")]
    NotCapturable {
        /// Hold ID.
        hold_id: HoldId,
        /// Current status.
        status: HoldStatus,
    },

    /// Hold is not in a releasable state.
    #[error("Hold {hold_id} cannot be released in status {status}")]
    NotReleasable {
        /// Hold ID.
        hold_id: HoldId,
        /// Current status.
        status: HoldStatus,
    },

    /// The card issuer requires the customer to re-authenticate.
    #[error(
        "Card for hold {hold_id} requires customer authentication; send the customer a new payment link"
    )]
    AuthenticationRequired {
        /// Hold ID.
        hold_id: HoldId,
    },
}

impl HoldError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_CAPTURE_AMOUNT",
            Self::ExceedsAuthorized { .. } => "CAPTURE_EXCEEDS_AUTHORIZED",
            Self::NotCapturable { .. } => "HOLD_NOT_CAPTURABLE",
            Self::NotReleasable { .. } => "HOLD_NOT_RELEASABLE",
            Self::AuthenticationRequired { .. } => "AUTHENTICATION_REQUIRED",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidAmount(_) => 400,
            _ => 422,
        }
    }
}

/// Hold implementation at the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldKind {
    /// Saved card; capture is a fresh off-session charge that may need
    /// customer re-authentication.
    Legacy,
    /// Funds frozen on the card; capture needs no further authentication.
    ManualCapture,
}

/// Hold lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    /// Customer has not finished authorizing.
    Pending,
    /// Authorized and capturable.
    Created,
    /// Captured (terminal).
    Captured,
    /// Cancelled by an operator (terminal).
    Released,
    /// Lapsed or abandoned (terminal).
    Expired,
}

impl HoldStatus {
    /// Maps a processor status string.
    ///
    /// A cancelled hold counts as expired when the processor cancelled it
    /// itself (`automatic`, `abandoned`).
    #[must_use]
    pub fn from_processor(kind: HoldKind, status: &str, cancellation_reason: Option<&str>) -> Self {
        match (kind, status) {
            (_, "canceled") => match cancellation_reason {
                Some("automatic" | "abandoned" | "expired") => Self::Expired,
                _ => Self::Released,
            },
            (HoldKind::ManualCapture, "requires_capture") => Self::Created,
            (HoldKind::ManualCapture, "succeeded") => Self::Captured,
            (HoldKind::Legacy, "succeeded") => Self::Created,
            _ => Self::Pending,
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Captured | Self::Released | Self::Expired)
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Created => write!(f, "CREATED"),
            Self::Captured => write!(f, "CAPTURED"),
            Self::Released => write!(f, "RELEASED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A hold as reported by the payments processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalHold {
    /// Processor ID.
    pub id: HoldId,
    /// Implementation.
    pub kind: HoldKind,
    /// Current status.
    pub status: HoldStatus,
    /// Originally authorized amount in pounds.
    pub authorized_amount: Decimal,
    /// Job the hold was taken for, from processor metadata.
    pub job_id: Option<JobId>,
    /// Processor customer, needed for legacy captures.
    pub customer_id: Option<String>,
    /// Saved payment method, needed for legacy captures.
    pub payment_method_id: Option<String>,
}

impl ExternalHold {
    /// Validates a capture of `amount`.
    ///
    /// # Errors
    ///
    /// Returns `HoldError` unless `0 < amount <= authorized_amount` and the
    /// hold is `CREATED`.
    pub fn validate_capture(&self, amount: Decimal) -> Result<(), HoldError> {
        if amount <= Decimal::ZERO {
            return Err(HoldError::InvalidAmount(amount));
        }
        if self.status != HoldStatus::Created {
            return Err(HoldError::NotCapturable {
                hold_id: self.id.clone(),
                status: self.status,
            });
        }
        if amount > self.authorized_amount {
            return Err(HoldError::ExceedsAuthorized {
                requested: amount,
                authorized: self.authorized_amount,
            });
        }
        Ok(())
    }

    /// Validates a release.
    ///
    /// # Errors
    ///
    /// Returns `HoldError::NotReleasable` unless the hold is `CREATED` or
    /// still `PENDING`.
    pub fn validate_release(&self) -> Result<(), HoldError> {
        if self.status.is_terminal() {
            return Err(HoldError::NotReleasable {
                hold_id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Amount left on the card after capturing `captured`.
    #[must_use]
    pub fn released_remainder(&self, captured: Decimal) -> Decimal {
        (self.authorized_amount - captured).max(Decimal::ZERO)
    }
}
