//! Ledger classifier.
//!
//! Flattens typed billing rows into one shape and tags each with `is_excess`
//! exactly once. Both passes of the net-excess calculator read the same tag,
//! so the deposit-ID set built in the first pass matches what the second
//! pass looks up.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::DepositId;

use super::row::{BillingRow, RowKind};

/// Keywords that mark a description as excess-related.
pub const EXCESS_KEYWORDS: [&str; 4] = ["excess", "xs", "insurance", "top up"];

static EXCESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = EXCESS_KEYWORDS
        .iter()
        .map(|keyword| {
            let body = keyword
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            if keyword.len() <= 2 {
                format!(r"\b{body}\b")
            } else {
                format!(r"\b{body}")
            }
        })
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternatives}")).expect("excess keyword pattern is valid")
});

/// Returns true if a free-text description names excess.
///
/// Matching is case-insensitive with `-` and `_` read as spaces. Keywords
/// must start on a word boundary; two-letter keywords (`xs`) must also end
/// on one, so `"XS deposit"` matches but `"xsmall"` does not.
#[must_use]
pub fn is_excess_description(description: &str) -> bool {
    if description.trim().is_empty() {
        return false;
    }
    let normalized = description.replace(['-', '_'], " ");
    EXCESS_PATTERN.is_match(&normalized)
}

/// A billing row flattened for the calculators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRow {
    /// Row kind.
    pub kind: RowKind,
    /// Row ID; deposit IDs are normalized.
    pub id: String,
    /// Signed amount as recorded by the hire platform.
    pub amount: Decimal,
    /// Free-text description (empty for job totals).
    pub description: String,
    /// Row date, when the platform supplied one.
    pub date: Option<NaiveDate>,
    /// Originating deposit for payment applications.
    pub owner_deposit_id: Option<DepositId>,
    /// Keyword classification, computed once.
    pub is_excess: bool,
}

impl ClassifiedRow {
    /// Returns true if the row carries a non-blank description.
    #[must_use]
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }

    /// Returns the deposit ID of a deposit row.
    #[must_use]
    pub fn deposit_id(&self) -> Option<DepositId> {
        (self.kind == RowKind::Deposit).then(|| DepositId::new(self.id.as_str()))
    }
}

impl From<&BillingRow> for ClassifiedRow {
    fn from(row: &BillingRow) -> Self {
        match row {
            BillingRow::JobTotal(r) => Self {
                kind: RowKind::JobTotal,
                id: r.id.clone(),
                amount: r.amount_ex_tax,
                description: String::new(),
                date: None,
                owner_deposit_id: None,
                is_excess: false,
            },
            BillingRow::Invoice(r) => Self {
                kind: RowKind::Invoice,
                id: r.id.clone(),
                amount: r.amount,
                is_excess: is_excess_description(&r.description),
                description: r.description.clone(),
                date: r.date,
                owner_deposit_id: None,
            },
            BillingRow::Deposit(r) => Self {
                kind: RowKind::Deposit,
                id: r.id.to_string(),
                amount: r.amount,
                is_excess: is_excess_description(&r.description),
                description: r.description.clone(),
                date: r.date,
                owner_deposit_id: None,
            },
            BillingRow::PaymentApplication(r) => Self {
                kind: RowKind::PaymentApplication,
                id: r.id.clone(),
                amount: r.amount,
                is_excess: is_excess_description(&r.description),
                description: r.description.clone(),
                date: r.date,
                owner_deposit_id: r.owner_deposit_id.clone(),
            },
        }
    }
}

/// Classifies typed rows, preserving order.
#[must_use]
pub fn classify(rows: &[BillingRow]) -> Vec<ClassifiedRow> {
    rows.iter().map(ClassifiedRow::from).collect()
}
