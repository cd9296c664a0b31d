//! Message store and outbox writer.
//!
//! Messages are written by [`OutboxWriter`] on the caller's connection, so a
//! domain write and its notification commit or roll back together.
//!
//! SQLite has no `SELECT ... FOR UPDATE SKIP LOCKED`, so workers claim rows
//! with a single conditional `UPDATE ... RETURNING` that stamps a claim token
//! and time. Rows claimed by another worker are skipped until the claim lease
//! expires. Outcome updates only apply while the caller still holds the claim.

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use courier_core::{
    Event, EventPayload, MessageId, OutboxMessage, OutboxStats, Payload, EVENTS_TOPIC,
};

use crate::error::{DbError, DbResult};

const TABLE: &str = "outbox_messages";

#[derive(sqlx::FromRow)]
struct OutboxRow {
    seq: i64,
    id: String,
    topic: String,
    payload: String,
    created_at: DateTime<Utc>,
    sent: bool,
    sent_at: Option<DateTime<Utc>>,
    retry_count: i64,
    last_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = DbError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|e| DbError::corrupt(TABLE, e))?;
        let payload: Payload = serde_json::from_str(&row.payload)?;
        let retry_count = u32::try_from(row.retry_count).map_err(|e| DbError::corrupt(TABLE, e))?;
        Ok(OutboxMessage {
            id: MessageId(id),
            topic: row.topic,
            payload,
            sent: row.sent,
            sent_at: row.sent_at,
            retry_count,
            last_retry_at: row.last_retry_at,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "rowid AS seq, id, topic, payload, created_at, sent, sent_at, \
     retry_count, last_retry_at, error_message";

/// Appends messages inside an existing transaction.
pub struct OutboxWriter;

impl OutboxWriter {
    /// Stage a message. No network I/O happens here.
    pub async fn enqueue(
        conn: &mut SqliteConnection,
        topic: &str,
        payload: &Payload,
    ) -> DbResult<MessageId> {
        let id = MessageId::new();
        let body = serde_json::to_string(payload)?;

        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, topic, payload, created_at, sent, retry_count)
            VALUES (?, ?, ?, ?, 0, 0)
            "#,
        )
        .bind(id.to_string())
        .bind(topic)
        .bind(body)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(message_id = %id, topic, "Enqueued outbox message");
        Ok(id)
    }

    pub async fn event_created(conn: &mut SqliteConnection, event: &Event) -> DbResult<MessageId> {
        Self::enqueue(conn, EVENTS_TOPIC, &EventPayload::event_created(event)).await
    }

    pub async fn event_updated(conn: &mut SqliteConnection, event: &Event) -> DbResult<MessageId> {
        Self::enqueue(conn, EVENTS_TOPIC, &EventPayload::event_updated(event)).await
    }
}

/// Parameters of a batch claim.
#[derive(Debug, Clone)]
pub struct ClaimRequest<'a> {
    /// Token identifying the claiming worker.
    pub worker_id: &'a str,
    pub batch_size: u32,
    pub max_retries: u32,
    /// Claims older than this are considered abandoned.
    pub lease: Duration,
}

/// SQLite-backed message store.
#[derive(Debug, Clone)]
pub struct OutboxStore {
    pool: SqlitePool,
}

impl OutboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stage a message in its own transaction.
    pub async fn enqueue(&self, topic: &str, payload: &Payload) -> DbResult<MessageId> {
        let mut conn = self.pool.acquire().await?;
        OutboxWriter::enqueue(&mut conn, topic, payload).await
    }

    pub async fn get(&self, id: MessageId) -> DbResult<Option<OutboxMessage>> {
        let row = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {COLUMNS} FROM outbox_messages WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OutboxMessage::try_from).transpose()
    }

    /// Pending messages, oldest first, regardless of retry count or claims.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {COLUMNS} FROM outbox_messages WHERE sent = 0 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    /// Claim up to `batch_size` deliverable messages, oldest first.
    ///
    /// Rows already claimed by a live lease are skipped, so concurrent workers
    /// never receive the same message. Rows still held by the same worker are
    /// claimed again.
    pub async fn claim_batch(&self, request: &ClaimRequest<'_>) -> DbResult<Vec<OutboxMessage>> {
        let now = Utc::now();
        let stale_before = now - request.lease;

        let mut rows = sqlx::query_as::<_, OutboxRow>(&format!(
            r#"
            UPDATE outbox_messages
            SET claimed_by = ?, claimed_at = ?
            WHERE id IN (
                SELECT id FROM outbox_messages
                WHERE sent = 0
                  AND retry_count < ?
                  AND (claimed_by IS NULL OR claimed_by = ? OR claimed_at < ?)
                ORDER BY created_at ASC, rowid ASC
                LIMIT ?
            )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(request.worker_id)
        .bind(now)
        .bind(i64::from(request.max_retries))
        .bind(request.worker_id)
        .bind(stale_before)
        .bind(i64::from(request.batch_size))
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the subquery order.
        rows.sort_by_key(|row| (row.created_at, row.seq));
        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    /// Drop every claim `worker_id` still holds on undelivered messages, so
    /// they are eligible again on the next poll. Returns the number released.
    pub async fn release_claims(&self, worker_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET claimed_by = NULL, claimed_at = NULL
            WHERE claimed_by = ? AND sent = 0
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Mark a claimed message as delivered.
    /// Returns false if the claim was lost to another worker.
    pub async fn mark_sent(&self, id: MessageId, worker_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET sent = 1, sent_at = ?, claimed_by = NULL, claimed_at = NULL
            WHERE id = ? AND claimed_by = ? AND sent = 0
            "#,
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a failed delivery attempt and release the claim.
    /// An existing error message is kept when `error` is `None`.
    pub async fn record_failure(
        &self,
        id: MessageId,
        worker_id: &str,
        error: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET retry_count = retry_count + 1,
                last_retry_at = ?,
                error_message = COALESCE(?, error_message),
                claimed_by = NULL,
                claimed_at = NULL
            WHERE id = ? AND claimed_by = ? AND sent = 0
            "#,
        )
        .bind(Utc::now())
        .bind(error)
        .bind(id.to_string())
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Counts for the stats and health endpoints.
    pub async fn stats(&self, max_retries: u32) -> DbResult<OutboxStats> {
        let (total, sent, pending, failed): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(sent = 1), 0),
                COALESCE(SUM(sent = 0), 0),
                COALESCE(SUM(sent = 0 AND retry_count >= ?), 0)
            FROM outbox_messages
            "#,
        )
        .bind(i64::from(max_retries))
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxStats {
            total_messages: total as u64,
            sent_messages: sent as u64,
            pending_messages: pending as u64,
            failed_messages: failed as u64,
        })
    }
}
