//! Hire platform billing ledger.
//!
//! This module turns the raw billing list into typed rows and classifies
//! them for the downstream calculators:
//! - Row decoding (tagged union keyed by `kind`)
//! - Excess keyword classification
//! - Error types for malformed rows

pub mod classify;
pub mod error;
pub mod row;

pub use classify::{ClassifiedRow, EXCESS_KEYWORDS, classify, is_excess_description};
pub use error::RowError;
pub use row::{
    BillingRow, DepositRow, InvoiceRow, JobTotalRow, PaymentApplicationRow, RowKind, parse_rows,
};
