//! Payment action errors.

use thiserror::Error;

use super::report::StepRecord;
use crate::gateway::UpstreamError;
use crate::hold::HoldError;
use crate::job::JobError;
use crate::ledger::RowError;
use crate::timing::TimingError;

/// Errors from payment actions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentActionError {
    /// Request rejected before any external call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with the job's current state.
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Excess timing forbids the action.
    #[error(transparent)]
    Timing(#[from] TimingError),

    /// Hold state forbids the action.
    #[error(transparent)]
    Hold(#[from] HoldError),

    /// Hire platform returned a malformed billing row.
    #[error("Malformed billing data: {0}")]
    Row(#[from] RowError),

    /// Hire platform returned a malformed job.
    #[error("Malformed job data: {0}")]
    Job(#[from] JobError),

    /// External call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A later step failed after earlier steps changed external state.
    #[error("Step {failed_step} failed after {} completed step(s): {message}", .completed.len())]
    PartialFailure {
        /// Step that failed.
        failed_step: String,
        /// Upstream error text.
        message: String,
        /// Steps already completed, with their external IDs.
        completed: Vec<StepRecord>,
    },
}

impl PaymentActionError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BusinessRule(_) => "BUSINESS_RULE_VIOLATION",
            Self::Timing(e) => e.error_code(),
            Self::Hold(e) => e.error_code(),
            Self::Row(e) => e.error_code(),
            Self::Job(_) => "MALFORMED_JOB",
            Self::Upstream(e) => e.error_code(),
            Self::PartialFailure { .. } => "PARTIAL_FAILURE",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::BusinessRule(_) => 422,
            Self::Timing(e) => e.http_status_code(),
            Self::Hold(e) => e.http_status_code(),
            Self::Row(_) | Self::Job(_) | Self::Upstream(_) | Self::PartialFailure { .. } => 502,
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a business rule error.
    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRule(message.into())
    }
}
