//! Hire platform interface.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hirebill_shared::types::{DepositId, JobId};

use super::error::UpstreamError;

/// A deposit (or negative deposit) to write into a job's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeposit {
    /// Job to write against.
    pub job_id: JobId,
    /// Signed amount; negative for a refund.
    pub amount: Decimal,
    /// Ledger description; decides hire vs. excess classification.
    pub description: String,
    /// Ledger date.
    pub date: NaiveDate,
    /// External payment reference (processor payment or refund ID).
    pub reference: Option<String>,
}

/// A refund written as a payment application out of an existing deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundApplication {
    /// Job to write against.
    pub job_id: JobId,
    /// Deposit the money leaves.
    pub deposit_id: DepositId,
    /// Positive amount refunded; the platform records it negative.
    pub amount: Decimal,
    /// Ledger description.
    pub description: String,
    /// Ledger date.
    pub date: NaiveDate,
}

/// Hire platform operations used by the billing core.
///
/// Implemented by `hirebill-connectors` over the platform's token-authenticated
/// HTTP endpoints.
pub trait HirePlatform: Send + Sync {
    /// Fetches the raw job payload.
    fn fetch_job(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<Value, UpstreamError>> + Send;

    /// Fetches the raw billing list.
    fn fetch_billing(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, UpstreamError>> + Send;

    /// Creates a deposit row and returns its ID.
    fn create_deposit(
        &self,
        deposit: NewDeposit,
    ) -> impl std::future::Future<Output = Result<DepositId, UpstreamError>> + Send;

    /// Records a refund as a payment application against a deposit.
    fn create_refund_application(
        &self,
        refund: RefundApplication,
    ) -> impl std::future::Future<Output = Result<String, UpstreamError>> + Send;

    /// Appends a free-text note to the job.
    fn append_note(
        &self,
        job_id: &JobId,
        note: &str,
    ) -> impl std::future::Future<Output = Result<(), UpstreamError>> + Send;

    /// Sets the job's status code.
    fn update_job_status(
        &self,
        job_id: &JobId,
        status: i64,
    ) -> impl std::future::Future<Output = Result<(), UpstreamError>> + Send;

    /// Pushes a deposit to the external accounting package.
    fn trigger_accounting_sync(
        &self,
        job_id: &JobId,
        deposit_id: &DepositId,
    ) -> impl std::future::Future<Output = Result<(), UpstreamError>> + Send;
}
