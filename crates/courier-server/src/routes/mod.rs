pub mod health;
pub mod outbox;
pub mod sync;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(outbox::routes())
        .merge(sync::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Log a storage failure and turn it into a 500.
pub(crate) fn storage_error(context: &str, e: impl std::fmt::Display) -> Response {
    tracing::error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", e),
    )
        .into_response()
}
