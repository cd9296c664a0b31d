use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use courier_core::OutboxHealth;

use super::storage_error;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/outbox/stats", get(stats))
        .route("/outbox/health", get(health))
}

/// GET /outbox/stats - Message counts by delivery state.
async fn stats(State(state): State<AppState>) -> Response {
    match state.outbox.stats(state.max_retries).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => storage_error("Failed to load outbox stats", e),
    }
}

/// GET /outbox/health - Warns when the pending backlog is large.
async fn health(State(state): State<AppState>) -> Response {
    match state.outbox.stats(state.max_retries).await {
        Ok(stats) => Json(OutboxHealth::from_stats(&stats)).into_response(),
        Err(e) => storage_error("Failed to load outbox health", e),
    }
}
