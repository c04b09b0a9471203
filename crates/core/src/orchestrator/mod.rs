//! Payment action orchestration.
//!
//! Each operation is a fixed sequence of calls against the hire platform,
//! the payments processor and the board. There is no distributed
//! transaction: a later step can fail after an earlier one succeeded, and
//! the error then names the failed step and everything already done.

pub mod error;
pub mod report;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::PaymentActionError;
pub use report::{ActionReport, StepRecord, StepStatus};
pub use service::{OrchestratorPolicy, PaymentOrchestrator};
pub use types::{CaptureRequest, ChargeRequest, HoldRequest, RefundRequest, ReleaseRequest};
