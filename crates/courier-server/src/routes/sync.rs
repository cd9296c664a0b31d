use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_sync::load_watermark;

use super::storage_error;
use crate::state::AppState;

const DEFAULT_RESULTS_LIMIT: u32 = 20;
const MAX_RESULTS_LIMIT: u32 = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/results", get(results))
        .route("/sync/watermark", get(watermark))
}

#[derive(Deserialize)]
struct ResultsQuery {
    limit: Option<u32>,
}

#[derive(Serialize)]
struct WatermarkResponse {
    last_successful_sync: Option<DateTime<Utc>>,
}

/// GET /sync/results?limit=N - Sync history, newest first.
async fn results(State(state): State<AppState>, Query(query): Query<ResultsQuery>) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RESULTS_LIMIT)
        .clamp(1, MAX_RESULTS_LIMIT);

    match state.sync_store.recent_results(limit).await {
        Ok(results) => Json(results).into_response(),
        Err(e) => storage_error("Failed to load sync results", e),
    }
}

/// GET /sync/watermark - Timestamp the next incremental sync starts from.
async fn watermark(State(state): State<AppState>) -> Response {
    match load_watermark(&state.sync_store).await {
        Ok(last_successful_sync) => Json(WatermarkResponse {
            last_successful_sync,
        })
        .into_response(),
        Err(e) => storage_error("Failed to load sync watermark", e),
    }
}
