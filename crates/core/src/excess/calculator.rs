//! Two-pass net excess calculator.
//!
//! The hire platform records an excess refund either as a negative deposit
//! row, or as a payment application whose sign and description decide what
//! it means:
//!
//! | description            | owner deposit | amount | meaning                 |
//! |------------------------|---------------|--------|-------------------------|
//! | matches excess keyword | any           | any    | excess refund           |
//! | empty                  | excess        | < 0    | excess usage (to hire)  |
//! | otherwise              | any           | any    | routine application     |
//!
//! Excess usage moves money from the excess pot to the hire balance. It adds
//! to hire paid and leaves `net_excess_paid` untouched; subtracting it here
//! as well would count the transfer twice.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::DepositId;

use crate::ledger::{ClassifiedRow, RowKind};

/// How a row contributed to the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treatment {
    /// Hire deposit or hire refund.
    HireDeposit,
    /// Excess deposit or negative excess deposit.
    ExcessDeposit,
    /// Description-bearing excess payment application.
    ExcessRefund,
    /// Automatic transfer of excess funds toward hire.
    ExcessUsage,
}

/// A row annotated for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedTransaction {
    /// Row ID.
    pub id: String,
    /// Row date.
    pub date: Option<NaiveDate>,
    /// Description as recorded.
    pub description: String,
    /// Signed amount as recorded.
    pub amount: Decimal,
    /// How the row was counted.
    pub treatment: Treatment,
}

impl AnnotatedTransaction {
    fn from_row(row: &ClassifiedRow, treatment: Treatment) -> Self {
        Self {
            id: row.id.clone(),
            date: row.date,
            description: row.description.clone(),
            amount: row.amount,
            treatment,
        }
    }
}

/// Totals derived from one pass over a job's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of job-total rows (ex tax).
    pub total_job_value_ex_tax: Decimal,
    /// Number of job-total rows seen; one for a well-formed job.
    pub job_total_rows: usize,
    /// Sum of invoice totals.
    pub total_invoiced: Decimal,
    /// Number of invoices.
    pub invoice_count: usize,
    /// Money put toward hire, net of hire refunds and including excess usage.
    pub total_hire_paid: Decimal,
    /// Money put toward excess, net of excess refunds. Signed.
    pub net_excess_paid: Decimal,
    /// Normalized IDs of excess deposits.
    pub excess_deposit_ids: BTreeSet<DepositId>,
    /// Rows counted toward hire.
    pub hire_transactions: Vec<AnnotatedTransaction>,
    /// Rows counted toward excess.
    pub excess_transactions: Vec<AnnotatedTransaction>,
}

impl LedgerTotals {
    /// Returns true if invoices exist.
    #[must_use]
    pub const fn has_invoices(&self) -> bool {
        self.invoice_count > 0
    }
}

/// Net excess calculator.
///
/// Stateless; every call recomputes from the rows it is given.
pub struct NetExcessCalculator;

impl NetExcessCalculator {
    /// Reconciles classified rows into ledger totals.
    ///
    /// Pass one handles deposits, invoices and job totals and builds the set
    /// of excess deposit IDs. Pass two handles payment applications, which
    /// may reference a deposit that appears later in row order.
    #[must_use]
    pub fn compute(rows: &[ClassifiedRow]) -> LedgerTotals {
        let mut totals = LedgerTotals::default();

        for row in rows {
            match row.kind {
                RowKind::JobTotal => {
                    totals.total_job_value_ex_tax += row.amount;
                    totals.job_total_rows += 1;
                }
                RowKind::Invoice => {
                    totals.total_invoiced += row.amount;
                    totals.invoice_count += 1;
                }
                RowKind::Deposit if row.is_excess => {
                    totals.net_excess_paid += row.amount;
                    totals.excess_deposit_ids.insert(DepositId::new(row.id.as_str()));
                    totals
                        .excess_transactions
                        .push(AnnotatedTransaction::from_row(row, Treatment::ExcessDeposit));
                }
                RowKind::Deposit => {
                    totals.total_hire_paid += row.amount;
                    totals
                        .hire_transactions
                        .push(AnnotatedTransaction::from_row(row, Treatment::HireDeposit));
                }
                RowKind::PaymentApplication => {}
            }
        }

        for row in rows.iter().filter(|r| r.kind == RowKind::PaymentApplication) {
            if row.has_description() && row.is_excess {
                totals.net_excess_paid += row.amount;
                totals
                    .excess_transactions
                    .push(AnnotatedTransaction::from_row(row, Treatment::ExcessRefund));
            } else if !row.has_description()
                && row.amount.is_sign_negative()
                && !row.amount.is_zero()
                && row
                    .owner_deposit_id
                    .as_ref()
                    .is_some_and(|owner| totals.excess_deposit_ids.contains(owner))
            {
                totals.total_hire_paid += row.amount.abs();
                totals
                    .hire_transactions
                    .push(AnnotatedTransaction::from_row(row, Treatment::ExcessUsage));
            }
        }

        totals
    }
}
