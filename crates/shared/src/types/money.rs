//! Money helpers with decimal precision.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Amounts are `rust_decimal::Decimal` in pounds; the payments processor
//! works in integer minor units (pence).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;
use thiserror::Error;

/// Errors converting or parsing money values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The value could not be parsed as an amount.
    #[error("invalid amount: {0}")]
    Invalid(String),

    /// The amount does not fit in minor units.
    #[error("amount out of range: {0}")]
    OutOfRange(Decimal),
}

/// Rounds to whole pence, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Converts pounds to pence.
///
/// # Errors
///
/// Returns `MoneyError::OutOfRange` if the amount overflows `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    (round_money(amount) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or(MoneyError::OutOfRange(amount))
}

/// Converts pence to pounds.
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Parses a vendor-formatted amount.
///
/// Accepts plain numbers, a leading currency symbol, thousands separators
/// and accounting-style parentheses for negatives: `"£1,200.00"`, `"-300"`,
/// `"(45.50)"`.
///
/// # Errors
///
/// Returns `MoneyError::Invalid` if nothing numeric remains.
pub fn parse_amount(raw: &str) -> Result<Decimal, MoneyError> {
    let trimmed = raw.trim();
    let (negated, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | '€' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Err(MoneyError::Invalid(raw.to_string()));
    }

    let value = Decimal::from_str(&cleaned).map_err(|_| MoneyError::Invalid(raw.to_string()))?;
    Ok(if negated { -value } else { value })
}

/// Formats an amount for notes and board updates, e.g. `£1,200.00`.
#[must_use]
pub fn format_gbp(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}£{grouped}.{frac}")
}
