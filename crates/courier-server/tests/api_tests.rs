use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tower::ServiceExt;

use courier_core::{EventStatus, NewEvent, Payload, SyncResult, EVENTS_TOPIC};
use courier_db::{init_database, CatalogStore, OutboxStore, SyncStore};
use courier_server::{create_router, AppState};

/// Create a test app with in-memory database.
async fn create_test_app() -> (axum::Router, SqlitePool) {
    let pool = init_database("sqlite::memory:").await.unwrap();
    let state = AppState::new(pool.clone(), 3);
    (create_router(state), pool)
}

/// Helper to GET a path and parse the JSON body.
async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn enqueue_many(pool: &SqlitePool, count: usize) {
    let store = OutboxStore::new(pool.clone());
    for _ in 0..count {
        store.enqueue(EVENTS_TOPIC, &Payload::new()).await.unwrap();
    }
}

// ============================================================================
// Health endpoint tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_app().await;

    let (status, json) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let (app, _) = create_test_app().await;

    let (status, json) = get_json(app, "/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_fails_when_database_closed() {
    let (app, pool) = create_test_app().await;
    pool.close().await;

    let (status, json) = get_json(app, "/ready").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unavailable");
}

// ============================================================================
// Outbox endpoint tests
// ============================================================================

#[tokio::test]
async fn test_outbox_stats_empty() {
    let (app, _) = create_test_app().await;

    let (status, json) = get_json(app, "/outbox/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_messages"], 0);
    assert_eq!(json["sent_messages"], 0);
    assert_eq!(json["pending_messages"], 0);
    assert_eq!(json["failed_messages"], 0);
}

#[tokio::test]
async fn test_outbox_stats_counts_states() {
    let (app, pool) = create_test_app().await;
    enqueue_many(&pool, 4).await;

    // One delivered, one out of retries
    let store = OutboxStore::new(pool.clone());
    let pending = store.pending(10).await.unwrap();
    sqlx::query("UPDATE outbox_messages SET sent = 1, sent_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(pending[0].id.to_string())
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE outbox_messages SET retry_count = 3 WHERE id = ?")
        .bind(pending[1].id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let (status, json) = get_json(app, "/outbox/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_messages"], 4);
    assert_eq!(json["sent_messages"], 1);
    assert_eq!(json["pending_messages"], 3);
    assert_eq!(json["failed_messages"], 1);
}

#[tokio::test]
async fn test_event_write_stages_message() {
    let (app, pool) = create_test_app().await;
    let catalog = CatalogStore::new(pool.clone());

    catalog
        .create_event(NewEvent {
            name: "Opening night".to_string(),
            event_date: Utc.with_ymd_and_hms(2025, 9, 1, 20, 0, 0).unwrap(),
            status: EventStatus::Open,
            place_id: None,
        })
        .await
        .unwrap();

    let (_, json) = get_json(app, "/outbox/stats").await;
    assert_eq!(json["total_messages"], 1);
    assert_eq!(json["pending_messages"], 1);
}

#[tokio::test]
async fn test_outbox_health_normal() {
    let (app, pool) = create_test_app().await;
    enqueue_many(&pool, 5).await;

    let (status, json) = get_json(app, "/outbox/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["pending_messages"], 5);
    assert_eq!(json["failed_messages"], 0);
    assert_eq!(json["message"], "Outbox is operating normally");
}

#[tokio::test]
async fn test_outbox_health_warns_on_backlog() {
    let (app, pool) = create_test_app().await;
    enqueue_many(&pool, 150).await;

    let (status, json) = get_json(app, "/outbox/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "warning");
    assert_eq!(json["pending_messages"], 150);
    assert_eq!(json["message"], "High number of pending messages");
}

// ============================================================================
// Sync endpoint tests
// ============================================================================

#[tokio::test]
async fn test_sync_results_empty() {
    let (app, _) = create_test_app().await;

    let (status, json) = get_json(app, "/sync/results").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_sync_results_newest_first_with_limit() {
    let (app, pool) = create_test_app().await;
    let store = SyncStore::new(pool);
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    for i in 0..3 {
        let mut result = SyncResult::started(base + Duration::hours(i));
        store.insert_result(&result).await.unwrap();
        result.complete(base + Duration::hours(i) + Duration::minutes(1), 1, 0, &[]);
        store.update_result(&result).await.unwrap();
    }

    let (status, json) = get_json(app.clone(), "/sync/results?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["started_at"], "2025-01-01T02:00:00Z");
    assert_eq!(results[0]["is_success"], true);
    assert_eq!(results[0]["new_events_count"], 1);

    // Out-of-range limits are clamped
    let (_, json) = get_json(app.clone(), "/sync/results?limit=0").await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, _) = get_json(app, "/sync/results?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_watermark() {
    let (app, pool) = create_test_app().await;

    let (status, json) = get_json(app.clone(), "/sync/watermark").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["last_successful_sync"].is_null());

    SyncStore::new(pool)
        .put_setting("last_successful_sync", "2025-02-03T04:05:06Z", "")
        .await
        .unwrap();

    let (_, json) = get_json(app, "/sync/watermark").await;
    assert_eq!(json["last_successful_sync"], "2025-02-03T04:05:06Z");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
