//! Net excess calculation.
//!
//! Two-pass reconciliation of classified ledger rows into hire and excess
//! totals. See [`NetExcessCalculator`].

pub mod calculator;

#[cfg(test)]
mod calculator_props;

pub use calculator::{AnnotatedTransaction, LedgerTotals, NetExcessCalculator, Treatment};
