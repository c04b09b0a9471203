//! Hold routes: capture and release.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, Connectors};
use hirebill_core::orchestrator::{ActionReport, CaptureRequest, ReleaseRequest};
use hirebill_shared::types::HoldId;

/// Creates the hold routes.
pub fn routes<C: Connectors>() -> Router<AppState<C>> {
    Router::new()
        .route("/holds/{hold_id}/capture", post(capture_hold::<C>))
        .route("/holds/{hold_id}/release", post(release_hold::<C>))
}

/// Request body for capturing a hold.
#[derive(Debug, Deserialize)]
pub struct CaptureBody {
    /// Amount to capture, at most the authorised amount.
    pub amount: Decimal,
    /// Why.
    pub reason: String,
}

/// Request body for releasing a hold.
#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    /// Why.
    pub reason: String,
}

/// POST `/holds/{hold_id}/capture`
async fn capture_hold<C: Connectors>(
    State(state): State<AppState<C>>,
    auth: AuthUser,
    Path(hold_id): Path<String>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<ActionReport>, ApiError> {
    info!(admin = %auth.subject(), hold_id = %hold_id, amount = %body.amount, "Capture requested");
    let report = state
        .orchestrator
        .capture_hold(CaptureRequest {
            hold_id: HoldId::new(hold_id),
            amount: body.amount,
            reason: body.reason,
        })
        .await?;
    Ok(Json(report))
}

/// POST `/holds/{hold_id}/release`
async fn release_hold<C: Connectors>(
    State(state): State<AppState<C>>,
    auth: AuthUser,
    Path(hold_id): Path<String>,
    Json(body): Json<ReleaseBody>,
) -> Result<Json<ActionReport>, ApiError> {
    info!(admin = %auth.subject(), hold_id = %hold_id, "Release requested");
    let report = state
        .orchestrator
        .release_hold(ReleaseRequest {
            hold_id: HoldId::new(hold_id),
            reason: body.reason,
        })
        .await?;
    Ok(Json(report))
}
