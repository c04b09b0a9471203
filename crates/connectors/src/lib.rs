//! HTTP clients for the external systems.
//!
//! This crate provides:
//! - `HirePlatformClient` implementing [`hirebill_core::gateway::HirePlatform`]
//! - `PaymentsClient` implementing [`hirebill_core::gateway::PaymentProcessor`]
//! - `BoardClient` implementing [`hirebill_core::gateway::Board`], with retries
//! - Payments webhook signature verification and event decoding

pub mod board;
pub mod hire;
mod http;
pub mod payments;
pub mod retry;
pub mod webhook;

pub use board::BoardClient;
pub use hire::HirePlatformClient;
pub use payments::PaymentsClient;
pub use retry::RetryPolicy;
pub use webhook::{PaymentEvent, SignatureError, WebhookVerifier, parse_event};
