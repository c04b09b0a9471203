//! Payments webhook verification and event decoding.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex>`; the
//! signature is HMAC-SHA256 over `"{t}.{raw body}"` keyed with the webhook
//! secret. Several `v1` entries may be present during secret rotation.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info};

use hirebill_core::gateway::{CompletedCheckout, PaymentKind};
use hirebill_shared::FieldAliases;
use hirebill_shared::types::{JobId, PaymentId, from_minor_units};

type HmacSha256 = Hmac<Sha256>;

const METADATA_JOB: FieldAliases = FieldAliases::new("job_id", &["job_id", "job", "jobId"]);
const METADATA_KIND: FieldAliases =
    FieldAliases::new("kind", &["kind", "payment_type", "type"]);

/// Webhook rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// No signature header.
    #[error("Missing webhook signature")]
    MissingHeader,

    /// Header present but unparseable.
    #[error("Malformed webhook signature header")]
    Malformed,

    /// Timestamp outside the tolerance window.
    #[error("Webhook timestamp outside tolerance ({age_secs}s)")]
    Stale {
        /// Signed timestamp age in seconds (negative when in the future).
        age_secs: i64,
    },

    /// No signature matched.
    #[error("Webhook signature mismatch")]
    Mismatch,

    /// Signed payload is not a usable event.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl SignatureError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "INVALID_WEBHOOK_PAYLOAD",
            _ => "INVALID_WEBHOOK_SIGNATURE",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidPayload(_) => 422,
            _ => 400,
        }
    }
}

/// Verifies signed webhook deliveries.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[hidden]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    /// Creates a verifier accepting timestamps within `tolerance_secs`.
    #[must_use]
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance: Duration::try_seconds(tolerance_secs.abs()).unwrap_or(Duration::MAX),
        }
    }

    /// Verifies `body` against the signature header.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` if the header is missing or malformed, the
    /// timestamp is stale, or no signature matches.
    pub fn verify(
        &self,
        header: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;
        let (timestamp, signatures) = parse_header(header)?;

        let age_secs = now.timestamp().saturating_sub(timestamp);
        if age_secs.unsigned_abs() > self.tolerance.num_seconds().unsigned_abs() {
            return Err(SignatureError::Stale { age_secs });
        }

        let expected = self.sign(timestamp, body)?;
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate).is_ok_and(|bytes| {
                bytes.len() == expected.len() && bool::from(bytes.as_slice().ct_eq(expected.as_slice()))
            })
        });
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Computes the raw signature for a timestamp and body.
    fn sign(&self, timestamp: i64, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Builds a header value for `body`, for tests and local tooling.
    #[must_use]
    pub fn signature_header(&self, timestamp: i64, body: &[u8]) -> String {
        let signature = self.sign(timestamp, body).map(hex::encode).unwrap_or_default();
        format!("t={timestamp},v1={signature}")
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(SignatureError::Malformed),
    }
}

/// A decoded webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A checkout for one of our jobs completed.
    CheckoutCompleted(CompletedCheckout),
    /// A payment intent succeeded; logged only.
    PaymentSucceeded {
        /// Payment intent.
        payment_id: PaymentId,
    },
    /// Anything else, acknowledged and ignored.
    Ignored {
        /// Event type.
        event_type: String,
    },
}

/// Decodes a verified event body.
///
/// # Errors
///
/// Returns `SignatureError::InvalidPayload` if the body is not an event.
pub fn parse_event(body: &[u8]) -> Result<PaymentEvent, SignatureError> {
    let event: Value =
        serde_json::from_slice(body).map_err(|e| SignatureError::InvalidPayload(e.to_string()))?;
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SignatureError::InvalidPayload("event has no type".to_string()))?
        .to_string();
    let object = event
        .pointer("/data/object")
        .ok_or_else(|| SignatureError::InvalidPayload("event has no data object".to_string()))?;

    match event_type.as_str() {
        "checkout.session.completed" => Ok(checkout_completed(object, event_type)),
        "payment_intent.succeeded" => {
            let id = object
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| SignatureError::InvalidPayload("payment intent has no id".to_string()))?;
            info!(payment_id = id, "payment intent succeeded");
            Ok(PaymentEvent::PaymentSucceeded {
                payment_id: PaymentId::new(id),
            })
        }
        _ => {
            debug!(event_type = %event_type, "ignoring webhook event");
            Ok(PaymentEvent::Ignored { event_type })
        }
    }
}

fn checkout_completed(session: &Value, event_type: String) -> PaymentEvent {
    let metadata = session.get("metadata").cloned().unwrap_or(Value::Null);
    let job_id = METADATA_JOB.string(&metadata).map(JobId::new);
    let kind = METADATA_KIND
        .string(&metadata)
        .and_then(|k| PaymentKind::parse(&k));
    let session_id = session.get("id").and_then(Value::as_str);
    let amount = session
        .get("amount_total")
        .and_then(Value::as_i64)
        .map(from_minor_units);

    let (Some(job_id), Some(kind), Some(session_id), Some(amount)) =
        (job_id, kind, session_id, amount)
    else {
        debug!(session = ?session.get("id"), "checkout session without job metadata; ignoring");
        return PaymentEvent::Ignored { event_type };
    };

    // Hold sessions complete unpaid; charges must be paid.
    let paid = session.get("payment_status").and_then(Value::as_str) == Some("paid");
    if kind != PaymentKind::ExcessHold && !paid {
        debug!(session_id, "checkout completed but not paid yet; ignoring");
        return PaymentEvent::Ignored { event_type };
    }

    let payment_id = match session.get("payment_intent") {
        Some(Value::String(id)) => Some(PaymentId::new(id.as_str())),
        Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(PaymentId::new),
        _ => None,
    };

    PaymentEvent::CheckoutCompleted(CompletedCheckout {
        session_id: session_id.to_string(),
        job_id,
        kind,
        amount,
        payment_id,
    })
}
