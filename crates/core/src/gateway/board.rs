//! Board system interface.

use serde::{Deserialize, Serialize};

use hirebill_shared::types::{BoardItemId, JobId};

use super::error::UpstreamError;
use crate::sync_record::{BoardUpdate, SyncRecord};

/// Status columns this system writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColumn {
    /// Hire deposit / balance status.
    Deposit,
    /// Excess status.
    Excess,
}

/// Status column labels.
pub mod status_labels {
    /// Hire deposit received.
    pub const DEPOSIT_PAID: &str = "Deposit Paid";
    /// Hire fully paid.
    pub const PAID_IN_FULL: &str = "Paid in Full";
    /// Hold checkout sent to the customer.
    pub const PRE_AUTH_REQUESTED: &str = "Pre-auth Requested";
    /// Customer completed the hold.
    pub const PRE_AUTH_TAKEN: &str = "Pre-auth Taken";
    /// Hold captured.
    pub const EXCESS_CAPTURED: &str = "Excess Captured";
    /// Hold released.
    pub const PRE_AUTH_RELEASED: &str = "Pre-auth Released";
    /// Excess charged upfront.
    pub const EXCESS_PAID: &str = "Excess Paid";
    /// Excess refunded.
    pub const EXCESS_REFUNDED: &str = "Excess Refunded";
}

/// Board operations used by the billing core.
///
/// Lookups and status writes are retried by the implementation; updates and
/// feed reads are attempted once.
pub trait Board: Send + Sync {
    /// Finds the item whose job-number column matches.
    fn find_item(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<Option<SyncRecord>, UpstreamError>> + Send;

    /// Sets a status column label.
    fn set_status(
        &self,
        item_id: &BoardItemId,
        column: StatusColumn,
        label: &str,
    ) -> impl std::future::Future<Output = Result<(), UpstreamError>> + Send;

    /// Posts a free-text update.
    fn post_update(
        &self,
        item_id: &BoardItemId,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), UpstreamError>> + Send;

    /// Reads the item's update feed.
    fn list_updates(
        &self,
        item_id: &BoardItemId,
    ) -> impl std::future::Future<Output = Result<Vec<BoardUpdate>, UpstreamError>> + Send;
}
