//! Courier DB - SQLite persistence for the outbox, catalog, and sync history.

pub mod catalog_store;
pub mod error;
pub mod outbox_store;
pub mod pool;
pub mod sync_store;

pub use catalog_store::CatalogStore;
pub use error::{DbError, DbResult};
pub use outbox_store::{ClaimRequest, OutboxStore, OutboxWriter};
pub use pool::{init_pool, ping, run_migrations};
pub use sync_store::SyncStore;

use sqlx::SqlitePool;

/// Open a database and create its schema.
pub async fn init_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = init_pool(database_url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
