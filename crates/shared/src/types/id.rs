//! Typed identifiers for vendor-assigned IDs.
//!
//! Every external system hands out its own opaque string IDs. Wrapping them
//! prevents passing a hold ID where a job ID is expected.

use serde::{Deserialize, Serialize};

/// Macro to generate typed ID wrappers around vendor strings.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a vendor ID, trimming surrounding whitespace.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.len() == id.len() {
                    Self(id)
                } else {
                    Self(trimmed.to_string())
                }
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the ID is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

typed_id!(JobId, "Hire platform job number.");
typed_id!(
    DepositId,
    "Hire platform deposit ID, normalized (marker prefix stripped)."
);
typed_id!(HoldId, "Payments processor hold (payment or setup intent) ID.");
typed_id!(PaymentId, "Payments processor payment intent ID.");
typed_id!(BoardItemId, "Board system item ID.");

impl DepositId {
    /// Normalizes a raw hire platform deposit ID.
    ///
    /// The ledger sometimes prefixes deposit IDs with a single non-numeric
    /// marker character (e.g. `e1234`). IDs are compared without it.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let stripped = trimmed.trim_start_matches(|c: char| !c.is_ascii_digit());
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            Self(stripped.to_string())
        } else {
            Self(trimmed.to_string())
        }
    }
}
