//! Payments processor interface.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hirebill_shared::types::{HoldId, JobId, PaymentId};

use super::error::UpstreamError;
use crate::hold::ExternalHold;

/// What a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Hire deposit.
    Deposit,
    /// Remaining hire balance.
    Balance,
    /// Excess taken as an immediate charge.
    Excess,
    /// Excess taken as a manual-capture hold.
    ExcessHold,
}

impl PaymentKind {
    /// Returns true for excess payments.
    #[must_use]
    pub const fn is_excess(self) -> bool {
        matches!(self, Self::Excess | Self::ExcessHold)
    }

    /// Metadata and wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Balance => "balance",
            Self::Excess => "excess",
            Self::ExcessHold => "excess_hold",
        }
    }

    /// Parses a metadata value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deposit" => Some(Self::Deposit),
            "balance" => Some(Self::Balance),
            "excess" => Some(Self::Excess),
            "excess_hold" | "pre_auth" | "preauth" => Some(Self::ExcessHold),
            _ => None,
        }
    }

    /// Customer-facing line item label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Deposit => "Hire deposit",
            Self::Balance => "Hire balance",
            Self::Excess => "Excess payment",
            Self::ExcessHold => "Excess pre-authorisation",
        }
    }
}

impl std::fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hosted checkout to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Job the payment is for.
    pub job_id: JobId,
    /// Payment kind; `ExcessHold` creates a manual-capture session.
    pub kind: PaymentKind,
    /// Amount in pounds.
    pub amount: Decimal,
    /// Customer email to prefill.
    pub customer_email: Option<String>,
    /// Line item description.
    pub description: String,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Hosted payment page.
    pub url: String,
}

/// A completed checkout, as delivered by the processor's webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedCheckout {
    /// Session ID.
    pub session_id: String,
    /// Job from session metadata.
    pub job_id: JobId,
    /// Kind from session metadata.
    pub kind: PaymentKind,
    /// Amount in pounds.
    pub amount: Decimal,
    /// Payment intent; for hold sessions this is the hold.
    pub payment_id: Option<PaymentId>,
}

/// A captured hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPayment {
    /// Resulting payment ID.
    pub payment_id: PaymentId,
    /// Amount captured in pounds.
    pub amount: Decimal,
}

/// Off-session charge against a legacy hold's saved card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCardCharge {
    /// Hold the card was saved under.
    pub hold_id: HoldId,
    /// Processor customer.
    pub customer_id: String,
    /// Saved payment method.
    pub payment_method_id: String,
    /// Amount in pounds.
    pub amount: Decimal,
    /// Job for metadata.
    pub job_id: JobId,
    /// Statement description.
    pub description: String,
}

/// Outcome of an off-session charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChargeOutcome {
    /// Charge succeeded.
    Succeeded {
        /// Resulting payment ID.
        payment_id: PaymentId,
    },
    /// The issuer wants the customer to authenticate.
    AuthenticationRequired,
}

/// A created refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Refund ID.
    pub id: String,
    /// Processor status (`succeeded`, `pending`, ...).
    pub status: String,
}

/// Payments processor operations used by the billing core.
pub trait PaymentProcessor: Send + Sync {
    /// Creates a hosted checkout session.
    fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> impl std::future::Future<Output = Result<CheckoutSession, UpstreamError>> + Send;

    /// Retrieves a hold by ID.
    fn retrieve_hold(
        &self,
        hold_id: &HoldId,
    ) -> impl std::future::Future<Output = Result<Option<ExternalHold>, UpstreamError>> + Send;

    /// Captures part or all of a manual-capture hold.
    fn capture_hold(
        &self,
        hold_id: &HoldId,
        amount: Decimal,
    ) -> impl std::future::Future<Output = Result<CapturedPayment, UpstreamError>> + Send;

    /// Charges the card saved under a legacy hold.
    fn charge_saved_card(
        &self,
        charge: SavedCardCharge,
    ) -> impl std::future::Future<Output = Result<ChargeOutcome, UpstreamError>> + Send;

    /// Cancels a hold, releasing the funds.
    fn cancel_hold(
        &self,
        hold_id: &HoldId,
    ) -> impl std::future::Future<Output = Result<(), UpstreamError>> + Send;

    /// Refunds a payment in part or in full.
    fn refund(
        &self,
        payment_id: &PaymentId,
        amount: Decimal,
        reason: &str,
    ) -> impl std::future::Future<Output = Result<RefundReceipt, UpstreamError>> + Send;
}
