use sqlx::SqlitePool;

use courier_db::{OutboxStore, SyncStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub outbox: OutboxStore,
    pub sync_store: SyncStore,
    /// Retry bound used to count failed messages.
    pub max_retries: u32,
}

impl AppState {
    pub fn new(pool: SqlitePool, max_retries: u32) -> Self {
        Self {
            outbox: OutboxStore::new(pool.clone()),
            sync_store: SyncStore::new(pool.clone()),
            pool,
            max_retries,
        }
    }
}
