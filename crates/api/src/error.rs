//! Error-to-response mapping.
//!
//! Every failure leaves the API as `{"error": CODE, "message": ...}` with
//! the status the originating error reports. Partial failures also carry
//! the failed step and the steps already completed, so an operator can
//! finish or reverse them by hand.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::error;

use hirebill_connectors::SignatureError;
use hirebill_core::auth::RateLimitError;
use hirebill_core::orchestrator::PaymentActionError;
use hirebill_shared::{AppError, SessionTokenError};

/// An error ready to be rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    extra: Option<Value>,
}

impl ApiError {
    fn new(status: u16, code: &'static str, message: String) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code,
            message,
            extra: None,
        }
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::new(err.status_code(), err.error_code(), err.to_string())
    }
}

impl From<PaymentActionError> for ApiError {
    fn from(err: PaymentActionError) -> Self {
        let mut api = Self::new(err.http_status_code(), err.error_code(), err.to_string());
        if let PaymentActionError::PartialFailure {
            failed_step,
            completed,
            ..
        } = &err
        {
            api.extra = Some(json!({
                "failed_step": failed_step,
                "completed_steps": completed,
            }));
        }
        api
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        let mut api = Self::new(err.http_status_code(), err.error_code(), err.to_string());
        if let RateLimitError::Locked { retry_after_secs } = err {
            api.extra = Some(json!({ "retry_after_secs": retry_after_secs }));
        }
        api
    }
}

impl From<SignatureError> for ApiError {
    fn from(err: SignatureError) -> Self {
        Self::new(err.http_status_code(), err.error_code(), err.to_string())
    }
}

impl From<SessionTokenError> for ApiError {
    fn from(err: SessionTokenError) -> Self {
        match err {
            SessionTokenError::Expired => {
                AppError::Unauthorized("Session has expired".to_string()).into()
            }
            SessionTokenError::EncodingError(_) => {
                error!(error = %err, "Failed to issue session token");
                AppError::Internal("Could not issue session token".to_string()).into()
            }
            SessionTokenError::DecodingError(_) | SessionTokenError::Invalid => {
                AppError::Unauthorized("Invalid or malformed session token".to_string()).into()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.code,
            "message": self.message,
        });
        if let (Some(Value::Object(extra)), Some(map)) = (self.extra, body.as_object_mut()) {
            map.extend(extra);
        }
        (self.status, Json(body)).into_response()
    }
}
