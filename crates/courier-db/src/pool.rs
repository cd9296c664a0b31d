use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Initialize database connection pool with recommended pragmas.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}

/// Create all tables if they don't exist.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
        .execute(pool)
        .await?;
    Ok(())
}

/// Check the database answers queries.
pub async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        ping(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for table in [
            "events",
            "outbox_messages",
            "places",
            "sync_results",
            "sync_settings",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("courier.db").display());

        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(dir.path().join("courier.db").exists());
    }

    #[tokio::test]
    async fn test_check_constraints() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        // Unknown event status should fail
        let result = sqlx::query(
            "INSERT INTO events (id, name, event_date, status, created_at, updated_at) \
             VALUES ('e1', 'Gig', '2025-01-01T00:00:00Z', 'cancelled', 'x', 'x')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());

        // Dangling place reference should fail
        let result = sqlx::query(
            "INSERT INTO events (id, name, event_date, status, place_id, created_at, updated_at) \
             VALUES ('e2', 'Gig', '2025-01-01T00:00:00Z', 'open', 'missing', 'x', 'x')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());

        // Negative retry count should fail
        let result = sqlx::query(
            "INSERT INTO outbox_messages (id, topic, payload, created_at, retry_count) \
             VALUES ('m1', 'events', '{}', 'x', -1)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
