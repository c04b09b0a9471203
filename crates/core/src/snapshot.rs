//! Job financial snapshot and available actions.
//!
//! A snapshot is rebuilt from the hire platform on every request and never
//! mutated; the hire platform stays the system of record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::{DepositId, HoldId, JobId};

use crate::balance::HireBalance;
use crate::excess::{AnnotatedTransaction, LedgerTotals, NetExcessCalculator};
use crate::gateway::PaymentKind;
use crate::job::JobRecord;
use crate::ledger::{BillingRow, ClassifiedRow, RowKind, classify};
use crate::policy::BillingPolicy;
use crate::sync_record::PreAuthMarker;
use crate::timing::{ExcessTimingState, TimingDecision, TimingError, TimingPolicy};

/// Excess-side figures for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcessSummary {
    /// On-hire vehicles carrying excess.
    pub vehicle_count: u32,
    /// Per-vehicle excess times vehicle count.
    pub excess_required: Decimal,
    /// Money retained as excess. Signed.
    pub net_excess_paid: Decimal,
    /// Excess still to collect, never negative.
    pub excess_outstanding: Decimal,
    /// Normalized IDs of excess deposits.
    pub excess_deposit_ids: BTreeSet<DepositId>,
}

/// Derived financial state of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFinancialSnapshot {
    /// Job number.
    pub job_id: JobId,
    /// Customer or company name.
    pub customer_name: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Hire platform status code.
    pub job_status: i64,
    /// Hire figures.
    pub hire: HireBalance,
    /// Excess figures.
    pub excess: ExcessSummary,
    /// Excess timing, absent when it could not be evaluated.
    pub timing: Option<TimingDecision>,
    /// Why timing could not be evaluated.
    #[serde(skip)]
    pub timing_error: Option<TimingError>,
    /// Holds completed but not yet captured or released.
    pub open_holds: Vec<PreAuthMarker>,
    /// Operations valid right now.
    pub actions: Vec<AvailableAction>,
    /// Rows counted toward hire.
    pub hire_transactions: Vec<AnnotatedTransaction>,
    /// Rows counted toward excess.
    pub excess_transactions: Vec<AnnotatedTransaction>,
    /// Data-quality warnings.
    pub warnings: Vec<String>,
    /// When the snapshot was computed.
    pub generated_at: DateTime<Utc>,
    #[serde(skip)]
    rows: Vec<ClassifiedRow>,
}

/// Inputs to a snapshot build.
pub struct SnapshotInput<'a> {
    /// Decoded job.
    pub job: &'a JobRecord,
    /// Decoded billing rows.
    pub rows: &'a [BillingRow],
    /// Holds recovered from the board feed.
    pub open_holds: Vec<PreAuthMarker>,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

impl JobFinancialSnapshot {
    /// Builds a snapshot.
    #[must_use]
    pub fn build(input: SnapshotInput<'_>, billing: &BillingPolicy, timing: &TimingPolicy) -> Self {
        let SnapshotInput {
            job,
            rows,
            open_holds,
            now,
        } = input;

        let classified = classify(rows);
        let totals = NetExcessCalculator::compute(&classified);
        let hire = HireBalance::compute(&totals, billing);

        let vehicle_count = job.vehicle_count();
        let excess_required = billing.excess_required(vehicle_count);
        let excess = ExcessSummary {
            vehicle_count,
            excess_required,
            net_excess_paid: totals.net_excess_paid,
            excess_outstanding: (excess_required - totals.net_excess_paid).max(Decimal::ZERO),
            excess_deposit_ids: totals.excess_deposit_ids.clone(),
        };

        let mut warnings = Vec::new();
        if totals.job_total_rows != 1 {
            warnings.push(format!(
                "Expected exactly one job total row, found {}",
                totals.job_total_rows
            ));
        }
        if totals.net_excess_paid < Decimal::ZERO {
            warnings.push(format!(
                "Net excess paid is negative ({}); refunds exceed excess received",
                totals.net_excess_paid
            ));
        }

        let evaluated = job
            .hire_window()
            .and_then(|window| timing.evaluate(now, window, vehicle_count > 0));
        let (decision, timing_error) = match evaluated {
            Ok(decision) => (Some(decision), None),
            Err(err) => {
                warnings.push(err.to_string());
                (None, Some(err))
            }
        };

        let actions = available_actions(&hire, &excess, decision.as_ref(), &open_holds, billing);
        let LedgerTotals {
            hire_transactions,
            excess_transactions,
            ..
        } = totals;

        Self {
            job_id: job.id.clone(),
            customer_name: job.customer_name.clone(),
            customer_email: job.customer_email.clone(),
            job_status: job.status,
            hire,
            excess,
            timing: decision,
            timing_error,
            open_holds,
            actions,
            hire_transactions,
            excess_transactions,
            warnings,
            generated_at: now,
            rows: classified,
        }
    }

    /// Returns the timing decision or the reason it is missing.
    ///
    /// # Errors
    ///
    /// Returns the `TimingError` recorded at build time.
    pub fn require_timing(&self) -> Result<&TimingDecision, TimingError> {
        match (&self.timing, &self.timing_error) {
            (Some(decision), _) => Ok(decision),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(TimingError::MissingHireDates),
        }
    }

    /// Default amount for a charge of `kind`.
    #[must_use]
    pub fn default_charge_amount(&self, kind: PaymentKind) -> Decimal {
        match kind {
            PaymentKind::Deposit => self.hire.deposit_outstanding,
            PaymentKind::Balance => self.hire.remaining_hire_balance.max(Decimal::ZERO),
            PaymentKind::Excess | PaymentKind::ExcessHold => self.excess.excess_outstanding,
        }
    }

    /// Finds a deposit row by (normalized) ID.
    #[must_use]
    pub fn deposit(&self, id: &DepositId) -> Option<&ClassifiedRow> {
        self.rows
            .iter()
            .find(|row| row.kind == RowKind::Deposit && row.id == id.as_str())
    }

    /// Returns true if a ledger row already references `reference`.
    #[must_use]
    pub fn has_payment_reference(&self, reference: &str) -> bool {
        !reference.is_empty()
            && self
                .rows
                .iter()
                .any(|row| row.kind == RowKind::Deposit && row.description.contains(reference))
    }

    /// Returns the open hold with `hold_id`.
    #[must_use]
    pub fn open_hold(&self, hold_id: &HoldId) -> Option<&PreAuthMarker> {
        self.open_holds.iter().find(|m| &m.hold_id == hold_id)
    }

    /// Returns true if the ledger already holds the capture of `hold_id`.
    ///
    /// A saved-card hold stays valid at the processor after it is charged,
    /// so the capture deposit is what closes it.
    #[must_use]
    pub fn hold_captured(&self, hold_id: &HoldId) -> bool {
        let needle = capture_tag(hold_id);
        self.rows.iter().any(|row| {
            row.kind == RowKind::Deposit
                && row.amount > Decimal::ZERO
                && row.description.contains(&needle)
        })
    }

    /// Sums the refunds already recorded against deposit `id`.
    #[must_use]
    pub fn refunded_against(&self, id: &DepositId) -> Decimal {
        let needle = refund_tag(id);
        self.rows
            .iter()
            .filter(|row| matches!(row.kind, RowKind::Deposit | RowKind::PaymentApplication))
            .filter(|row| row.amount < Decimal::ZERO && row.description.contains(&needle))
            .map(|row| row.amount.abs())
            .sum()
    }
}

/// Description prefix of the deposit recording a hold capture.
#[must_use]
pub fn capture_tag(hold_id: &HoldId) -> String {
    format!("Excess pre-auth captured {hold_id}:")
}

/// Description tag linking a refund row to the deposit it refunds.
#[must_use]
pub fn refund_tag(deposit_id: &DepositId) -> String {
    format!("(deposit {deposit_id})")
}

/// An operation valid for a job right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AvailableAction {
    /// Take the hire deposit.
    TakeHireDeposit {
        /// Suggested amount.
        amount: Decimal,
    },
    /// Take the remaining hire balance.
    TakeBalance {
        /// Suggested amount.
        amount: Decimal,
    },
    /// Send an excess hold checkout.
    CreateExcessHold {
        /// Suggested amount.
        amount: Decimal,
    },
    /// Charge excess upfront.
    TakeExcessUpfront {
        /// Suggested amount.
        amount: Decimal,
    },
    /// Capture an open hold.
    CaptureHold {
        /// Hold ID.
        hold_id: HoldId,
        /// Authorized amount.
        max_amount: Decimal,
    },
    /// Release an open hold.
    ReleaseHold {
        /// Hold ID.
        hold_id: HoldId,
    },
    /// Refund retained excess.
    RefundExcess {
        /// Refundable amount.
        max_amount: Decimal,
    },
}

/// Derives the currently valid operations.
#[must_use]
pub fn available_actions(
    hire: &HireBalance,
    excess: &ExcessSummary,
    timing: Option<&TimingDecision>,
    open_holds: &[PreAuthMarker],
    billing: &BillingPolicy,
) -> Vec<AvailableAction> {
    let mut actions = Vec::new();

    if !hire.deposit_paid && hire.deposit_outstanding > Decimal::ZERO {
        actions.push(AvailableAction::TakeHireDeposit {
            amount: hire.deposit_outstanding,
        });
    }
    if !hire.fully_paid && hire.remaining_hire_balance > billing.paid_epsilon {
        actions.push(AvailableAction::TakeBalance {
            amount: hire.remaining_hire_balance,
        });
    }

    let excess_due = excess.excess_outstanding > Decimal::ZERO;
    match timing.map(|t| t.state) {
        Some(ExcessTimingState::HoldAvailable) if excess_due && open_holds.is_empty() => {
            actions.push(AvailableAction::CreateExcessHold {
                amount: excess.excess_outstanding,
            });
        }
        Some(ExcessTimingState::UpfrontPaymentRequired | ExcessTimingState::TooLate)
            if excess_due =>
        {
            actions.push(AvailableAction::TakeExcessUpfront {
                amount: excess.excess_outstanding,
            });
        }
        _ => {}
    }

    for hold in open_holds {
        actions.push(AvailableAction::CaptureHold {
            hold_id: hold.hold_id.clone(),
            max_amount: hold.amount,
        });
        actions.push(AvailableAction::ReleaseHold {
            hold_id: hold.hold_id.clone(),
        });
    }

    if excess.net_excess_paid > Decimal::ZERO {
        actions.push(AvailableAction::RefundExcess {
            max_amount: excess.net_excess_paid,
        });
    }

    actions
}
