//! Job-scoped routes: snapshot, checkouts, refunds.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, Connectors};
use hirebill_core::gateway::PaymentKind;
use hirebill_core::orchestrator::{ActionReport, ChargeRequest, HoldRequest, RefundRequest};
use hirebill_core::snapshot::JobFinancialSnapshot;
use hirebill_shared::types::{DepositId, JobId, PaymentId};

/// Creates the job routes.
pub fn routes<C: Connectors>() -> Router<AppState<C>> {
    Router::new()
        .route("/jobs/{job_id}/snapshot", get(get_snapshot::<C>))
        .route("/jobs/{job_id}/holds", post(create_hold::<C>))
        .route("/jobs/{job_id}/charges", post(create_charge::<C>))
        .route("/jobs/{job_id}/refunds", post(refund_deposit::<C>))
}

// ============================================================================
// Request Types
// ============================================================================

/// Request body for creating an excess hold.
#[derive(Debug, Default, Deserialize)]
pub struct CreateHoldBody {
    /// Amount; defaults to the outstanding excess.
    pub amount: Option<Decimal>,
}

/// Request body for creating a charge checkout.
#[derive(Debug, Deserialize)]
pub struct CreateChargeBody {
    /// What the charge is for.
    pub kind: PaymentKind,
    /// Amount; defaults per kind.
    pub amount: Option<Decimal>,
}

/// Request body for refunding a deposit.
#[derive(Debug, Deserialize)]
pub struct RefundBody {
    /// Deposit being refunded.
    pub deposit_id: DepositId,
    /// Amount to refund.
    pub amount: Decimal,
    /// Why.
    pub reason: String,
    /// Processor payment to refund; omit for manual refunds.
    pub payment_id: Option<PaymentId>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET `/jobs/{job_id}/snapshot` - Fresh financial snapshot of a job.
async fn get_snapshot<C: Connectors>(
    State(state): State<AppState<C>>,
    _auth: AuthUser,
    Path(job_id): Path<String>,
) -> Result<Json<JobFinancialSnapshot>, ApiError> {
    let snapshot = state.orchestrator.load_snapshot(&JobId::new(job_id)).await?;
    Ok(Json(snapshot))
}

/// POST `/jobs/{job_id}/holds` - Create a manual-capture hold checkout.
async fn create_hold<C: Connectors>(
    State(state): State<AppState<C>>,
    auth: AuthUser,
    Path(job_id): Path<String>,
    Json(body): Json<CreateHoldBody>,
) -> Result<(StatusCode, Json<ActionReport>), ApiError> {
    info!(admin = %auth.subject(), job_id = %job_id, "Hold requested");
    let report = state
        .orchestrator
        .create_hold(HoldRequest {
            job_id: JobId::new(job_id),
            amount: body.amount,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// POST `/jobs/{job_id}/charges` - Create an immediate-charge checkout.
async fn create_charge<C: Connectors>(
    State(state): State<AppState<C>>,
    auth: AuthUser,
    Path(job_id): Path<String>,
    Json(body): Json<CreateChargeBody>,
) -> Result<(StatusCode, Json<ActionReport>), ApiError> {
    info!(admin = %auth.subject(), job_id = %job_id, kind = %body.kind, "Charge requested");
    let report = state
        .orchestrator
        .create_charge(ChargeRequest {
            job_id: JobId::new(job_id),
            kind: body.kind,
            amount: body.amount,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// POST `/jobs/{job_id}/refunds` - Refund part or all of a deposit.
async fn refund_deposit<C: Connectors>(
    State(state): State<AppState<C>>,
    auth: AuthUser,
    Path(job_id): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<ActionReport>, ApiError> {
    info!(
        admin = %auth.subject(),
        job_id = %job_id,
        deposit_id = %body.deposit_id,
        amount = %body.amount,
        "Refund requested"
    );
    let report = state
        .orchestrator
        .refund_deposit(RefundRequest {
            job_id: JobId::new(job_id),
            deposit_id: body.deposit_id,
            amount: body.amount,
            reason: body.reason,
            payment_id: body.payment_id,
        })
        .await?;
    Ok(Json(report))
}
