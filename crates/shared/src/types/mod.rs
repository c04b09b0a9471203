//! Common types used across the application.

pub mod id;
pub mod money;

pub use id::*;
pub use money::{MoneyError, format_gbp, from_minor_units, parse_amount, round_money, to_minor_units};
