//! Payments processor HTTP client.
//!
//! Form-encoded requests with bearer authentication. Every POST carries an
//! idempotency key derived from the request, so a repeated operation is
//! deduplicated by the processor. Amounts cross the wire in minor units.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hirebill_core::gateway::{
    CapturedPayment, ChargeOutcome, CheckoutRequest, CheckoutSession, ExternalSystem, PaymentKind,
    PaymentProcessor, RefundReceipt, SavedCardCharge, UpstreamError,
};
use hirebill_core::hold::{ExternalHold, HoldKind, HoldStatus};
use hirebill_shared::FieldAliases;
use hirebill_shared::config::PaymentsConfig;
use hirebill_shared::types::{HoldId, JobId, PaymentId, from_minor_units, to_minor_units};

use crate::http::{build_client, read_json, send_error};

const SYSTEM: ExternalSystem = ExternalSystem::Payments;

/// Prefix of setup-intent IDs, used by legacy holds.
const SETUP_INTENT_PREFIX: &str = "seti_";

const METADATA_JOB: FieldAliases = FieldAliases::new("job_id", &["job_id", "job", "jobId"]);
const METADATA_AMOUNT: FieldAliases =
    FieldAliases::new("amount", &["amount_minor", "amount", "excess_amount"]);

/// Processor client.
#[derive(Debug, Clone)]
pub struct PaymentsClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    currency: String,
    success_url: String,
    cancel_url: String,
}

impl PaymentsClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the HTTP client cannot be built.
    pub fn new(config: &PaymentsConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_client(SYSTEM, config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            currency: config.currency.to_lowercase(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| send_error(SYSTEM, &e))?;
        read_json(SYSTEM, response).await.map(|(_, body)| body)
    }

    async fn post(&self, path: &str, form: &[(String, String)]) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key(path, form))
            .form(form)
            .send()
            .await
            .map_err(|e| send_error(SYSTEM, &e))?;
        read_json(SYSTEM, response).await.map(|(_, body)| body)
    }
}

/// Name-based key over the path and form; identical requests share a key.
fn idempotency_key(path: &str, form: &[(String, String)]) -> String {
    let mut name = String::from(path);
    for (key, value) in form {
        name.push('\n');
        name.push_str(key);
        name.push('=');
        name.push_str(value);
    }
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

fn minor(amount: Decimal) -> Result<String, UpstreamError> {
    to_minor_units(amount)
        .map(|m| m.to_string())
        .map_err(|e| UpstreamError::http(SYSTEM, 400, e.to_string()))
}

fn field(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Reads an ID that may be expanded into an object.
fn id_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(ToString::to_string),
        _ => None,
    }
}

fn require_str(body: &Value, key: &str) -> Result<String, UpstreamError> {
    str_field(body, key)
        .ok_or_else(|| UpstreamError::http(SYSTEM, 200, format!("response has no {key}")))
}

/// Builds the checkout session form.
fn checkout_form(
    request: &CheckoutRequest,
    currency: &str,
    success_url: &str,
    cancel_url: &str,
) -> Result<Vec<(String, String)>, UpstreamError> {
    let mut form = vec![
        field("mode", "payment"),
        field("success_url", success_url),
        field("cancel_url", cancel_url),
        field("line_items[0][quantity]", "1"),
        field("line_items[0][price_data][currency]", currency),
        field("line_items[0][price_data][unit_amount]", minor(request.amount)?),
        field("line_items[0][price_data][product_data][name]", request.description.clone()),
        field("metadata[job_id]", request.job_id.to_string()),
        field("metadata[kind]", request.kind.as_str()),
        field("payment_intent_data[metadata][job_id]", request.job_id.to_string()),
        field("payment_intent_data[metadata][kind]", request.kind.as_str()),
    ];
    if let Some(email) = &request.customer_email {
        form.push(field("customer_email", email.clone()));
    }
    if request.kind == PaymentKind::ExcessHold {
        form.push(field("payment_intent_data[capture_method]", "manual"));
    }
    Ok(form)
}

/// Maps a payment intent (manual capture) to a hold.
fn payment_intent_hold(body: &Value) -> Result<ExternalHold, UpstreamError> {
    let id = require_str(body, "id")?;
    let status = require_str(body, "status")?;
    let amount = body
        .get("amount")
        .and_then(Value::as_i64)
        .map(from_minor_units)
        .ok_or_else(|| UpstreamError::http(SYSTEM, 200, "payment intent has no amount"))?;
    let metadata = body.get("metadata").cloned().unwrap_or(Value::Null);
    Ok(ExternalHold {
        id: HoldId::new(id),
        kind: HoldKind::ManualCapture,
        status: HoldStatus::from_processor(
            HoldKind::ManualCapture,
            &status,
            body.get("cancellation_reason").and_then(Value::as_str),
        ),
        authorized_amount: amount,
        job_id: METADATA_JOB.string(&metadata).map(JobId::new),
        customer_id: id_field(body, "customer"),
        payment_method_id: id_field(body, "payment_method"),
    })
}

/// Maps a setup intent (legacy hold) to a hold. The authorized amount lives
/// in metadata, in minor units.
fn setup_intent_hold(body: &Value) -> Result<ExternalHold, UpstreamError> {
    let id = require_str(body, "id")?;
    let status = require_str(body, "status")?;
    let metadata = body.get("metadata").cloned().unwrap_or(Value::Null);
    let amount = METADATA_AMOUNT
        .integer(&metadata)
        .map(from_minor_units)
        .ok_or_else(|| UpstreamError::http(SYSTEM, 200, "legacy hold has no amount metadata"))?;
    Ok(ExternalHold {
        id: HoldId::new(id),
        kind: HoldKind::Legacy,
        status: HoldStatus::from_processor(
            HoldKind::Legacy,
            &status,
            body.get("cancellation_reason").and_then(Value::as_str),
        ),
        authorized_amount: amount,
        job_id: METADATA_JOB.string(&metadata).map(JobId::new),
        customer_id: id_field(body, "customer"),
        payment_method_id: id_field(body, "payment_method"),
    })
}

fn is_legacy(hold_id: &HoldId) -> bool {
    hold_id.as_str().starts_with(SETUP_INTENT_PREFIX)
}

impl PaymentProcessor for PaymentsClient {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, UpstreamError> {
        let form = checkout_form(&request, &self.currency, &self.success_url, &self.cancel_url)?;
        let body = self.post("/v1/checkout/sessions", &form).await?;
        let session = CheckoutSession {
            id: require_str(&body, "id")?,
            url: require_str(&body, "url")?,
        };
        info!(job_id = %request.job_id, kind = %request.kind, session_id = %session.id, "checkout session created");
        Ok(session)
    }

    async fn retrieve_hold(&self, hold_id: &HoldId) -> Result<Option<ExternalHold>, UpstreamError> {
        let path = if is_legacy(hold_id) {
            format!("/v1/setup_intents/{hold_id}")
        } else {
            format!("/v1/payment_intents/{hold_id}")
        };
        let body = match self.get(&path).await {
            Ok(body) => body,
            Err(UpstreamError {
                status: Some(404), ..
            }) => {
                debug!(hold_id = %hold_id, "hold not found at processor");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let hold = if is_legacy(hold_id) {
            setup_intent_hold(&body)?
        } else {
            payment_intent_hold(&body)?
        };
        Ok(Some(hold))
    }

    async fn capture_hold(&self, hold_id: &HoldId, amount: Decimal) -> Result<CapturedPayment, UpstreamError> {
        let form = [field("amount_to_capture", minor(amount)?)];
        let body = self
            .post(&format!("/v1/payment_intents/{hold_id}/capture"), &form)
            .await?;
        let captured = body
            .get("amount_received")
            .and_then(Value::as_i64)
            .map_or(amount, from_minor_units);
        Ok(CapturedPayment {
            payment_id: PaymentId::new(require_str(&body, "id")?),
            amount: captured,
        })
    }

    async fn charge_saved_card(&self, charge: SavedCardCharge) -> Result<ChargeOutcome, UpstreamError> {
        let form = [
            field("amount", minor(charge.amount)?),
            field("currency", self.currency.clone()),
            field("customer", charge.customer_id.clone()),
            field("payment_method", charge.payment_method_id.clone()),
            field("off_session", "true"),
            field("confirm", "true"),
            field("description", charge.description.clone()),
            field("metadata[job_id]", charge.job_id.to_string()),
            field("metadata[hold_id]", charge.hold_id.to_string()),
            field("metadata[kind]", PaymentKind::Excess.as_str()),
        ];
        let body = match self.post("/v1/payment_intents", &form).await {
            Ok(body) => body,
            Err(e) if e.status == Some(402) && e.message.contains("authentication") => {
                warn!(hold_id = %charge.hold_id, "off-session charge needs customer authentication");
                return Ok(ChargeOutcome::AuthenticationRequired);
            }
            Err(e) => return Err(e),
        };
        match str_field(&body, "status").as_deref() {
            Some("succeeded" | "processing") => Ok(ChargeOutcome::Succeeded {
                payment_id: PaymentId::new(require_str(&body, "id")?),
            }),
            Some("requires_action" | "requires_payment_method") => {
                Ok(ChargeOutcome::AuthenticationRequired)
            }
            other => Err(UpstreamError::http(
                SYSTEM,
                200,
                format!("unexpected payment status {}", other.unwrap_or("none")),
            )),
        }
    }

    async fn cancel_hold(&self, hold_id: &HoldId) -> Result<(), UpstreamError> {
        let path = if is_legacy(hold_id) {
            format!("/v1/setup_intents/{hold_id}/cancel")
        } else {
            format!("/v1/payment_intents/{hold_id}/cancel")
        };
        let form = [field("cancellation_reason", "requested_by_customer")];
        self.post(&path, &form).await?;
        info!(hold_id = %hold_id, "hold cancelled");
        Ok(())
    }

    async fn refund(
        &self,
        payment_id: &PaymentId,
        amount: Decimal,
        reason: &str,
    ) -> Result<RefundReceipt, UpstreamError> {
        let form = [
            field("payment_intent", payment_id.to_string()),
            field("amount", minor(amount)?),
            field("reason", "requested_by_customer"),
            field("metadata[reason]", reason),
        ];
        let body = self.post("/v1/refunds", &form).await?;
        Ok(RefundReceipt {
            id: require_str(&body, "id")?,
            status: str_field(&body, "status").unwrap_or_else(|| "pending".to_string()),
        })
    }
}
