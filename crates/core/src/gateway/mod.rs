//! Interfaces to the three external systems.
//!
//! The core never talks HTTP. The connectors crate implements these traits
//! with real clients; tests implement them with in-memory mocks.

pub mod board;
pub mod error;
pub mod hire;
pub mod payments;

pub use board::{Board, StatusColumn, status_labels};
pub use error::{ExternalSystem, UpstreamError};
pub use hire::{HirePlatform, NewDeposit, RefundApplication};
pub use payments::{
    CapturedPayment, ChargeOutcome, CheckoutRequest, CheckoutSession, CompletedCheckout,
    PaymentKind, PaymentProcessor, RefundReceipt, SavedCardCharge,
};
