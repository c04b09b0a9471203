//! Ledger row decoding errors.

use thiserror::Error;

/// Errors raised while decoding hire platform billing rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// The row is not a JSON object.
    #[error("Billing row {index} is not an object")]
    NotAnObject {
        /// Position in the billing list.
        index: usize,
    },

    /// The row has no `kind` discriminator.
    #[error("Billing row {index} has no kind")]
    MissingKind {
        /// Position in the billing list.
        index: usize,
    },

    /// A field required by the row's kind is missing or unparseable.
    #[error("Billing row {index} (kind {kind}) is missing {field}")]
    MissingField {
        /// Position in the billing list.
        index: usize,
        /// Kind code of the row.
        kind: i64,
        /// Logical field name.
        field: &'static str,
    },
}

impl RowError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAnObject { .. } => "ROW_NOT_OBJECT",
            Self::MissingKind { .. } => "ROW_MISSING_KIND",
            Self::MissingField { .. } => "ROW_MISSING_FIELD",
        }
    }
}
