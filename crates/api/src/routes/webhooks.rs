//! Payments processor webhook.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::{AppState, Connectors};
use hirebill_connectors::{PaymentEvent, parse_event};

/// Header carrying `t=<unix>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Creates the webhook routes.
pub fn routes<C: Connectors>() -> Router<AppState<C>> {
    Router::new().route("/webhooks/payments", post(payments_webhook::<C>))
}

/// POST `/webhooks/payments`
///
/// The signature is checked against the raw body before anything is parsed.
/// Rejections the processor could never fix by redelivering (bad amount,
/// unknown job) are acknowledged so it stops retrying; upstream failures
/// return an error status so the event is redelivered. Redelivery is safe
/// because recording skips payments already in the ledger.
async fn payments_webhook<C: Connectors>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state.webhooks.verify(signature, &body, Utc::now())?;

    match parse_event(&body)? {
        PaymentEvent::CheckoutCompleted(checkout) => {
            let session_id = checkout.session_id.clone();
            match state.orchestrator.record_payment(checkout).await {
                Ok(report) => Ok(Json(json!({ "received": true, "report": report }))),
                Err(e) if e.http_status_code() < 500 => {
                    warn!(session_id = %session_id, error = %e, "Checkout completion not recorded");
                    Ok(Json(json!({
                        "received": true,
                        "recorded": false,
                        "reason": e.to_string(),
                    })))
                }
                Err(e) => Err(e.into()),
            }
        }
        PaymentEvent::PaymentSucceeded { payment_id } => {
            info!(payment_id = %payment_id, "Payment succeeded");
            Ok(Json(json!({ "received": true })))
        }
        PaymentEvent::Ignored { event_type } => {
            info!(event_type = %event_type, "Ignoring webhook event");
            Ok(Json(json!({ "received": true })))
        }
    }
}
