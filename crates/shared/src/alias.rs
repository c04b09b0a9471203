//! Field-alias resolution for vendor JSON.
//!
//! The hire platform and board system return the same logical field under
//! several names depending on endpoint and account configuration
//! (`customer_name`, `CUSTOMER_NAME`, `NAME`, ...). Each external entity
//! declares one alias table; decoding resolves through it once, at the
//! boundary, and the rest of the system only sees typed records.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::types::money::parse_amount;

/// Ordered alias list for one logical field.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    /// Logical field name, used in error messages.
    pub field: &'static str,
    /// Candidate keys, most specific first.
    pub aliases: &'static [&'static str],
}

impl FieldAliases {
    /// Declares an alias list.
    #[must_use]
    pub const fn new(field: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { field, aliases }
    }

    /// Returns the first alias present with a non-null, non-empty value.
    #[must_use]
    pub fn resolve<'a>(&self, object: &'a Value) -> Option<&'a Value> {
        self.aliases
            .iter()
            .filter_map(|key| object.get(*key))
            .find(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
    }

    /// Resolves the field as a string. Numbers are rendered without quotes.
    #[must_use]
    pub fn string(&self, object: &Value) -> Option<String> {
        match self.resolve(object)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Resolves the field as a decimal amount.
    ///
    /// JSON numbers are converted through their textual form, never through
    /// `f64` arithmetic.
    #[must_use]
    pub fn decimal(&self, object: &Value) -> Option<Decimal> {
        match self.resolve(object)? {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => parse_amount(s).ok(),
            _ => None,
        }
    }

    /// Resolves the field as an integer, accepting numeric strings.
    #[must_use]
    pub fn integer(&self, object: &Value) -> Option<i64> {
        match self.resolve(object)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Resolves the field as a boolean, accepting `1`/`0` and `"true"`/`"false"`.
    #[must_use]
    pub fn boolean(&self, object: &Value) -> Option<bool> {
        match self.resolve(object)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}
