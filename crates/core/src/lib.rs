//! Core billing logic for Hirebill.
//!
//! This crate contains the reconciliation rules and payment sequencing with
//! ZERO web or HTTP dependencies. External systems are reached through the
//! traits in [`gateway`].
//!
//! # Modules
//!
//! - `ledger` - Billing row decoding and excess classification
//! - `excess` - Two-pass hire/excess reconciliation
//! - `balance` - Hire balance and required deposit
//! - `timing` - Excess collection timing
//! - `hold` - External hold lifecycle
//! - `snapshot` - Per-job financial snapshot and available actions
//! - `orchestrator` - Multi-step payment actions
//! - `auth` - Admin password and login rate limiting

pub mod auth;
pub mod balance;
pub mod excess;
pub mod gateway;
pub mod hold;
pub mod job;
pub mod ledger;
pub mod orchestrator;
pub mod policy;
pub mod snapshot;
pub mod sync_record;
pub mod timing;
