//! Payment action inputs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::{DepositId, HoldId, JobId, PaymentId};

use crate::gateway::PaymentKind;

/// Input for creating an excess hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRequest {
    /// Job.
    pub job_id: JobId,
    /// Amount; defaults to the outstanding excess.
    pub amount: Option<Decimal>,
}

/// Input for creating an immediate charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Job.
    pub job_id: JobId,
    /// What the charge is for.
    pub kind: PaymentKind,
    /// Amount; defaults per kind from the snapshot.
    pub amount: Option<Decimal>,
}

/// Input for capturing a hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Hold.
    pub hold_id: HoldId,
    /// Amount to capture.
    pub amount: Decimal,
    /// Why; recorded in the ledger and notes.
    pub reason: String,
}

/// Input for releasing a hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// Hold.
    pub hold_id: HoldId,
    /// Why; recorded in notes.
    pub reason: String,
}

/// Input for refunding a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Job.
    pub job_id: JobId,
    /// Deposit being refunded (marker prefix allowed).
    pub deposit_id: DepositId,
    /// Positive amount to refund.
    pub amount: Decimal,
    /// Why; recorded in the ledger and notes.
    pub reason: String,
    /// Processor payment to refund; absent for manual refunds.
    pub payment_id: Option<PaymentId>,
}
