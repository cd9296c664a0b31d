use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use courier_core::{SyncResult, SyncSetting};

use crate::error::{DbError, DbResult};

#[derive(sqlx::FromRow)]
struct SyncResultRow {
    id: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    new_events_count: i64,
    updated_events_count: i64,
    is_success: bool,
    error_message: String,
}

impl TryFrom<SyncResultRow> for SyncResult {
    type Error = DbError;

    fn try_from(row: SyncResultRow) -> Result<Self, Self::Error> {
        let count = |n: i64| u32::try_from(n).map_err(|e| DbError::corrupt("sync_results", e));
        Ok(SyncResult {
            id: Uuid::parse_str(&row.id).map_err(|e| DbError::corrupt("sync_results", e))?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            new_events_count: count(row.new_events_count)?,
            updated_events_count: count(row.updated_events_count)?,
            is_success: row.is_success,
            error_message: row.error_message,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SettingRow> for SyncSetting {
    fn from(row: SettingRow) -> Self {
        SyncSetting {
            key: row.key,
            value: row.value,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const RESULT_COLUMNS: &str = "id, started_at, finished_at, new_events_count, \
     updated_events_count, is_success, error_message";

/// Sync settings (watermark) and run history.
#[derive(Debug, Clone)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_setting(&self, key: &str) -> DbResult<Option<SyncSetting>> {
        let row = sqlx::query_as::<_, SettingRow>(
            "SELECT key, value, description, created_at, updated_at FROM sync_settings WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SyncSetting::from))
    }

    /// Insert or replace a setting, keeping its original `created_at`.
    pub async fn put_setting(&self, key: &str, value: &str, description: &str) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO sync_settings (key, value, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a newly started run.
    pub async fn insert_result(&self, result: &SyncResult) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO sync_results ({RESULT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(result.id.to_string())
        .bind(result.started_at)
        .bind(result.finished_at)
        .bind(i64::from(result.new_events_count))
        .bind(i64::from(result.updated_events_count))
        .bind(result.is_success)
        .bind(&result.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write the final state of a run over its existing row.
    pub async fn update_result(&self, result: &SyncResult) -> DbResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE sync_results
            SET finished_at = ?, new_events_count = ?, updated_events_count = ?,
                is_success = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(result.finished_at)
        .bind(i64::from(result.new_events_count))
        .bind(i64::from(result.updated_events_count))
        .bind(result.is_success)
        .bind(&result.error_message)
        .bind(result.id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound {
                entity: "sync result",
                id: result.id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn get_result(&self, id: Uuid) -> DbResult<Option<SyncResult>> {
        let row = sqlx::query_as::<_, SyncResultRow>(&format!(
            "SELECT {RESULT_COLUMNS} FROM sync_results WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncResult::try_from).transpose()
    }

    /// Most recent runs first.
    pub async fn recent_results(&self, limit: u32) -> DbResult<Vec<SyncResult>> {
        let rows = sqlx::query_as::<_, SyncResultRow>(&format!(
            "SELECT {RESULT_COLUMNS} FROM sync_results ORDER BY started_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncResult::try_from).collect()
    }

    /// The most recent finished, successful run.
    pub async fn latest_success(&self) -> DbResult<Option<SyncResult>> {
        let row = sqlx::query_as::<_, SyncResultRow>(&format!(
            "SELECT {RESULT_COLUMNS} FROM sync_results \
             WHERE is_success = 1 AND finished_at IS NOT NULL \
             ORDER BY started_at DESC, rowid DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncResult::try_from).transpose()
    }

    pub async fn count_results(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
