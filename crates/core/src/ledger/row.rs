//! Typed billing rows.
//!
//! The hire platform's billing list is a flat array of heterogeneous objects
//! tagged by a numeric `kind`. Each kind is decoded into its own variant with
//! the fields that kind requires; anything else is rejected here, before the
//! classifier sees it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use hirebill_shared::FieldAliases;
use hirebill_shared::types::DepositId;

use super::error::RowError;

const KIND: FieldAliases = FieldAliases::new("kind", &["kind", "KIND", "type"]);
const ID: FieldAliases = FieldAliases::new("id", &["id", "ID", "number", "NUMBER"]);
const DATE: FieldAliases = FieldAliases::new("date", &["date", "DATE", "issue_date"]);
const DESCRIPTION: FieldAliases = FieldAliases::new(
    "description",
    &["desc", "description", "DESCRIPTION", "memo", "MEMO"],
);
const JOB_TOTAL_AMOUNT: FieldAliases = FieldAliases::new(
    "amount",
    &["total_ex_tax", "accrued", "debit", "amount", "total"],
);
const INVOICE_AMOUNT: FieldAliases =
    FieldAliases::new("amount", &["total_inc_tax", "debit", "amount", "total"]);
const DEPOSIT_AMOUNT: FieldAliases =
    FieldAliases::new("amount", &["credit", "amount", "paid", "total"]);
const APPLICATION_AMOUNT: FieldAliases =
    FieldAliases::new("amount", &["amount", "credit", "applied", "total"]);
const OWNER_DEPOSIT: FieldAliases = FieldAliases::new(
    "owner_deposit_id",
    &["owner", "owner_id", "OWNER", "deposit_id", "ownerDepositId"],
);

/// Billing row discriminator as used by the hire platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Ex-tax contract value of the job (exactly one per job).
    JobTotal,
    /// Issued invoice.
    Invoice,
    /// Application of a deposit toward an invoice, or money moved out of one.
    PaymentApplication,
    /// Money received (positive) or refunded (negative).
    Deposit,
}

impl RowKind {
    /// Maps a hire platform kind code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::JobTotal),
            1 => Some(Self::Invoice),
            3 => Some(Self::PaymentApplication),
            6 => Some(Self::Deposit),
            _ => None,
        }
    }

    /// Returns the hire platform kind code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::JobTotal => 0,
            Self::Invoice => 1,
            Self::PaymentApplication => 3,
            Self::Deposit => 6,
        }
    }
}

/// Job total row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTotalRow {
    /// Row ID.
    pub id: String,
    /// Contract value excluding tax.
    pub amount_ex_tax: Decimal,
}

/// Invoice row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRow {
    /// Invoice ID.
    pub id: String,
    /// Issue date.
    pub date: Option<NaiveDate>,
    /// Free-text description.
    pub description: String,
    /// Invoice total including tax.
    pub amount: Decimal,
}

/// Deposit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRow {
    /// Normalized deposit ID.
    pub id: DepositId,
    /// Date received or refunded.
    pub date: Option<NaiveDate>,
    /// Free-text description.
    pub description: String,
    /// Positive for money received, negative for a refund.
    pub amount: Decimal,
}

/// Payment application row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplicationRow {
    /// Row ID.
    pub id: String,
    /// Date applied.
    pub date: Option<NaiveDate>,
    /// Free-text description; empty for automatic applications.
    pub description: String,
    /// Positive when applied to an invoice, negative when moved out of a deposit.
    pub amount: Decimal,
    /// Deposit the application was generated from.
    pub owner_deposit_id: Option<DepositId>,
}

/// One entry in a job's billing ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingRow {
    /// Kind 0.
    JobTotal(JobTotalRow),
    /// Kind 1.
    Invoice(InvoiceRow),
    /// Kind 3.
    PaymentApplication(PaymentApplicationRow),
    /// Kind 6.
    Deposit(DepositRow),
}

impl BillingRow {
    /// Returns the row's kind.
    #[must_use]
    pub const fn kind(&self) -> RowKind {
        match self {
            Self::JobTotal(_) => RowKind::JobTotal,
            Self::Invoice(_) => RowKind::Invoice,
            Self::PaymentApplication(_) => RowKind::PaymentApplication,
            Self::Deposit(_) => RowKind::Deposit,
        }
    }

    /// Decodes one raw billing-list entry.
    ///
    /// Returns `Ok(None)` for kinds this system does not reconcile (credit
    /// notes, headers and the like).
    ///
    /// # Errors
    ///
    /// Returns `RowError` if the entry is not an object, has no kind, or
    /// lacks a field its kind requires.
    pub fn from_raw(index: usize, raw: &Value) -> Result<Option<Self>, RowError> {
        if !raw.is_object() {
            return Err(RowError::NotAnObject { index });
        }

        let code = KIND
            .integer(raw)
            .ok_or(RowError::MissingKind { index })?;
        let Some(kind) = RowKind::from_code(code) else {
            debug!(index, kind = code, "skipping billing row of unreconciled kind");
            return Ok(None);
        };

        let missing = |field: &'static str| RowError::MissingField {
            index,
            kind: code,
            field,
        };
        let id = ID.string(raw).ok_or_else(|| missing("id"))?;
        let date = DATE.string(raw).as_deref().and_then(parse_date);
        let description = DESCRIPTION.string(raw).unwrap_or_default();

        let row = match kind {
            RowKind::JobTotal => Self::JobTotal(JobTotalRow {
                id,
                amount_ex_tax: JOB_TOTAL_AMOUNT
                    .decimal(raw)
                    .ok_or_else(|| missing("amount"))?,
            }),
            RowKind::Invoice => Self::Invoice(InvoiceRow {
                id,
                date,
                description,
                amount: INVOICE_AMOUNT
                    .decimal(raw)
                    .ok_or_else(|| missing("amount"))?,
            }),
            RowKind::Deposit => Self::Deposit(DepositRow {
                id: DepositId::normalize(&id),
                date,
                description,
                amount: DEPOSIT_AMOUNT
                    .decimal(raw)
                    .ok_or_else(|| missing("amount"))?,
            }),
            RowKind::PaymentApplication => Self::PaymentApplication(PaymentApplicationRow {
                id,
                date,
                description,
                amount: APPLICATION_AMOUNT
                    .decimal(raw)
                    .ok_or_else(|| missing("amount"))?,
                owner_deposit_id: OWNER_DEPOSIT
                    .string(raw)
                    .filter(|s| s != "0")
                    .map(|s| DepositId::normalize(&s)),
            }),
        };
        Ok(Some(row))
    }
}

/// Decodes a whole billing list, skipping unreconciled kinds.
///
/// # Errors
///
/// Fails on the first malformed row; a ledger with a row dropped would
/// silently misstate the totals.
pub fn parse_rows(raw: &[Value]) -> Result<Vec<BillingRow>, RowError> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, value)| BillingRow::from_raw(index, value).transpose())
        .collect()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d/%m/%Y"))
        .ok()
}
