//! Property-based tests for the net excess calculator.
//!
//! - Idempotence: recomputing identical rows yields identical totals
//! - Order independence: totals do not depend on row order
//! - Oracle: without excess usage rows, net excess equals a one-pass sum

use proptest::prelude::*;
use rust_decimal::Decimal;

use hirebill_shared::types::DepositId;

use super::calculator::NetExcessCalculator;
use crate::ledger::{BillingRow, DepositRow, PaymentApplicationRow, RowKind, classify};

/// Strategy for signed amounts (-2,000.00 to 2,000.00).
fn signed_amount() -> impl Strategy<Value = Decimal> {
    (-200_000i64..200_000i64).prop_map(|pence| Decimal::new(pence, 2))
}

fn description() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Excess pre-auth".to_string()),
        Just("XS refund".to_string()),
        Just("Hire deposit".to_string()),
        Just("Balance".to_string()),
        Just("insurance top-up".to_string()),
    ]
}

fn deposit_id() -> impl Strategy<Value = String> {
    (1u32..6).prop_map(|n| format!("e{n}"))
}

fn row() -> impl Strategy<Value = BillingRow> {
    prop_oneof![
        (deposit_id(), description(), signed_amount()).prop_map(|(id, description, amount)| {
            BillingRow::Deposit(DepositRow {
                id: DepositId::normalize(&id),
                date: None,
                description,
                amount,
            })
        }),
        (1u32..1000, description(), signed_amount(), deposit_id()).prop_map(
            |(id, description, amount, owner)| {
                BillingRow::PaymentApplication(PaymentApplicationRow {
                    id: id.to_string(),
                    date: None,
                    description,
                    amount,
                    owner_deposit_id: Some(DepositId::normalize(&owner)),
                })
            }
        ),
    ]
}

fn rows() -> impl Strategy<Value = Vec<BillingRow>> {
    prop::collection::vec(row(), 0..20)
}

/// One-pass reference: excess deposits plus description-bearing excess
/// applications.
fn oracle_net_excess(rows: &[BillingRow]) -> Decimal {
    classify(rows)
        .iter()
        .filter(|r| r.is_excess)
        .filter(|r| match r.kind {
            RowKind::Deposit => true,
            RowKind::PaymentApplication => r.has_description(),
            _ => false,
        })
        .map(|r| r.amount)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_compute_is_idempotent(rows in rows()) {
        let classified = classify(&rows);
        let first = NetExcessCalculator::compute(&classified);
        let second = NetExcessCalculator::compute(&classify(&rows));

        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_totals_independent_of_order(rows in rows(), seed in any::<u64>()) {
        let forward = NetExcessCalculator::compute(&classify(&rows));

        let mut shuffled = rows.clone();
        let len = shuffled.len();
        if len > 1 {
            let offset = usize::try_from(seed % len as u64).unwrap_or(0);
            shuffled.rotate_left(offset);
            shuffled.reverse();
        }
        let reordered = NetExcessCalculator::compute(&classify(&shuffled));

        prop_assert_eq!(forward.net_excess_paid, reordered.net_excess_paid);
        prop_assert_eq!(forward.total_hire_paid, reordered.total_hire_paid);
        prop_assert_eq!(forward.excess_deposit_ids, reordered.excess_deposit_ids);
    }

    #[test]
    fn prop_matches_oracle_without_usage_rows(rows in rows()) {
        // Drop every row the calculator could treat as excess usage.
        let totals = NetExcessCalculator::compute(&classify(&rows));
        let filtered: Vec<BillingRow> = rows
            .into_iter()
            .filter(|row| match row {
                BillingRow::PaymentApplication(app) => {
                    let is_usage = app.description.trim().is_empty()
                        && app.amount < Decimal::ZERO
                        && app
                            .owner_deposit_id
                            .as_ref()
                            .is_some_and(|o| totals.excess_deposit_ids.contains(o));
                    !is_usage
                }
                _ => true,
            })
            .collect();

        let recomputed = NetExcessCalculator::compute(&classify(&filtered));
        prop_assert_eq!(recomputed.net_excess_paid, oracle_net_excess(&filtered));
        // Usage rows never move the excess figure.
        prop_assert_eq!(recomputed.net_excess_paid, totals.net_excess_paid);
    }
}
