//! Upstream error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External system an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalSystem {
    /// Hire platform.
    HirePlatform,
    /// Payments processor.
    Payments,
    /// Board system.
    Board,
}

impl std::fmt::Display for ExternalSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HirePlatform => write!(f, "hire platform"),
            Self::Payments => write!(f, "payments processor"),
            Self::Board => write!(f, "board"),
        }
    }
}

/// A failed or unparseable external call, with the upstream's own text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{system} error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct UpstreamError {
    /// Which system failed.
    pub system: ExternalSystem,
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Upstream error text.
    pub message: String,
}

impl UpstreamError {
    /// Creates an error with an HTTP status.
    pub fn http(system: ExternalSystem, status: u16, message: impl Into<String>) -> Self {
        Self {
            system,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates an error for a call that produced no usable response.
    pub fn transport(system: ExternalSystem, message: impl Into<String>) -> Self {
        Self {
            system,
            status: None,
            message: message.into(),
        }
    }

    /// Returns true for failures worth retrying: no response, 429 or 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 429 || status >= 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self.system {
            ExternalSystem::HirePlatform => "HIRE_PLATFORM_ERROR",
            ExternalSystem::Payments => "PAYMENTS_ERROR",
            ExternalSystem::Board => "BOARD_ERROR",
        }
    }
}
