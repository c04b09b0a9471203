//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, Connectors, middleware::auth::auth_middleware};

pub mod auth;
pub mod health;
pub mod holds;
pub mod jobs;
pub mod webhooks;

/// Creates the API router, wrapping operator routes in session authentication.
pub fn api_routes_with_state<C: Connectors>(state: &AppState<C>) -> Router<AppState<C>> {
    // Operator routes that require an admin session
    let protected_routes = Router::new()
        .merge(jobs::routes())
        .merge(holds::routes())
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            auth_middleware,
        ));

    // The webhook authenticates by signature, not session
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(webhooks::routes())
        .merge(protected_routes)
}
