//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for job snapshots and payment actions
//! - The signed payments webhook
//! - Session authentication middleware
//! - Error-to-response mapping

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use hirebill_connectors::{BoardClient, HirePlatformClient, PaymentsClient, WebhookVerifier};
use hirebill_core::auth::{AdminCredential, InMemoryAttemptStore, LoginRateLimiter};
use hirebill_core::gateway::{Board, HirePlatform, PaymentProcessor};
use hirebill_core::orchestrator::PaymentOrchestrator;
use hirebill_shared::SessionTokenService;

/// The set of external-system clients a router is built over.
pub trait Connectors: Send + Sync + 'static {
    /// Hire platform client.
    type Hire: HirePlatform + 'static;
    /// Payments processor client.
    type Payments: PaymentProcessor + 'static;
    /// Board client.
    type Board: Board + 'static;
}

/// The production HTTP clients.
#[derive(Debug)]
pub struct LiveConnectors;

impl Connectors for LiveConnectors {
    type Hire = HirePlatformClient;
    type Payments = PaymentsClient;
    type Board = BoardClient;
}

/// Orchestrator over a connector set.
pub type Orchestrator<C> =
    PaymentOrchestrator<<C as Connectors>::Hire, <C as Connectors>::Payments, <C as Connectors>::Board>;

/// Application state shared across handlers.
pub struct AppState<C: Connectors> {
    /// Payment action orchestrator.
    pub orchestrator: Orchestrator<C>,
    /// Session token service.
    pub sessions: Arc<SessionTokenService>,
    /// Configured admin password.
    pub admin: Arc<AdminCredential>,
    /// Per-address login limiter.
    pub login_limiter: LoginRateLimiter<InMemoryAttemptStore>,
    /// Payments webhook signature verifier.
    pub webhooks: Arc<WebhookVerifier>,
}

impl<C: Connectors> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            sessions: Arc::clone(&self.sessions),
            admin: Arc::clone(&self.admin),
            login_limiter: self.login_limiter.clone(),
            webhooks: Arc::clone(&self.webhooks),
        }
    }
}

/// State of the production server.
pub type LiveState = AppState<LiveConnectors>;

/// Creates the main application router.
pub fn create_router<C: Connectors>(state: AppState<C>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(&state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
