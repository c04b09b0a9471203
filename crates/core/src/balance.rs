//! Hire balance calculator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::round_money;

use crate::excess::LedgerTotals;
use crate::policy::BillingPolicy;

/// Hire-side figures for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireBalance {
    /// Contract value excluding tax.
    pub total_job_value_ex_tax: Decimal,
    /// Contract value including tax.
    pub total_job_value_inc_tax: Decimal,
    /// Sum of invoices.
    pub total_invoiced: Decimal,
    /// Invoiced total if any invoices exist, otherwise the gross job value.
    pub actual_total_owed: Decimal,
    /// Money put toward hire.
    pub total_hire_paid: Decimal,
    /// Amount still owed; negative when overpaid.
    pub remaining_hire_balance: Decimal,
    /// Deposit needed to secure the booking.
    pub required_deposit: Decimal,
    /// Required deposit still to be paid, never negative.
    pub deposit_outstanding: Decimal,
    /// True once hire paid covers the required deposit.
    pub deposit_paid: bool,
    /// True once the remaining balance is within tolerance of zero.
    pub fully_paid: bool,
}

impl HireBalance {
    /// Computes hire figures from ledger totals.
    ///
    /// A job owing exactly the small-job threshold still pays in full; one
    /// pence above it falls under the percentage-or-floor rule.
    #[must_use]
    pub fn compute(totals: &LedgerTotals, policy: &BillingPolicy) -> Self {
        let total_job_value_inc_tax =
            round_money(totals.total_job_value_ex_tax * (Decimal::ONE + policy.tax_rate));
        let actual_total_owed = if totals.has_invoices() {
            totals.total_invoiced
        } else {
            total_job_value_inc_tax
        };

        let required_deposit = Self::required_deposit(actual_total_owed, policy);
        let remaining_hire_balance = actual_total_owed - totals.total_hire_paid;

        Self {
            total_job_value_ex_tax: totals.total_job_value_ex_tax,
            total_job_value_inc_tax,
            total_invoiced: totals.total_invoiced,
            actual_total_owed,
            total_hire_paid: totals.total_hire_paid,
            remaining_hire_balance,
            required_deposit,
            deposit_outstanding: (required_deposit - totals.total_hire_paid).max(Decimal::ZERO),
            deposit_paid: totals.total_hire_paid >= required_deposit,
            fully_paid: remaining_hire_balance <= policy.paid_epsilon,
        }
    }

    /// Deposit required for an amount owed.
    #[must_use]
    pub fn required_deposit(owed: Decimal, policy: &BillingPolicy) -> Decimal {
        if owed <= policy.small_job_threshold {
            owed
        } else {
            round_money(owed * policy.deposit_rate).max(policy.minimum_deposit)
        }
    }
}
