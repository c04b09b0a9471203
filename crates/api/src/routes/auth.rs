//! Admin login.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::extractors::ClientAddr;
use crate::{AppState, Connectors};
use hirebill_shared::AppError;
use hirebill_shared::auth::{LoginRequest, LoginResponse};

/// Creates the auth router.
pub fn routes<C: Connectors>() -> Router<AppState<C>> {
    Router::new().route("/auth/login", post(login::<C>))
}

/// POST /auth/login - Verify the admin password and issue a session token.
///
/// Failed attempts are counted per source address; once the limit is hit
/// the address is locked out and gets 429 until the lockout ends.
async fn login<C: Connectors>(
    State(state): State<AppState<C>>,
    ClientAddr(client): ClientAddr,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let now = Utc::now();
    state.login_limiter.check(&client, now).await?;

    let valid = state.admin.verify(&payload.password).map_err(|e| {
        error!(error = %e, "Password verification error");
        AppError::Internal("An error occurred during login".to_string())
    })?;

    if !valid {
        let failures = state.login_limiter.record_failure(&client, now).await?;
        warn!(client = %client, failures, "Failed admin login attempt");
        return Err(AppError::Unauthorized("Invalid password".to_string()).into());
    }

    state.login_limiter.record_success(&client).await?;
    let token = state.sessions.issue()?;
    info!(client = %client, "Admin logged in");

    Ok(Json(LoginResponse {
        token,
        expires_in: state.sessions.expires_in(),
    }))
}
