use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema-less message body, captured at enqueue time.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Topic used for event lifecycle notifications.
pub const EVENTS_TOPIC: &str = "events";

/// Messages at or above this retry count are no longer claimed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pending backlog at which the outbox reports a warning.
pub const HEALTH_PENDING_THRESHOLD: u64 = 100;

/// Unique identifier of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message staged for delivery.
///
/// Only the delivery state (`sent`, `sent_at`, `retry_count`, `last_retry_at`,
/// `error_message`) changes after creation. A message is either pending or
/// sent; one that keeps failing stays pending with a growing `retry_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: MessageId,
    pub topic: String,
    pub payload: Payload,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Whether the retry budget is spent (the message is dead-lettered).
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        !self.sent && self.retry_count >= max_retries
    }
}

/// Aggregate counts over the message store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStats {
    pub total_messages: u64,
    pub sent_messages: u64,
    pub pending_messages: u64,
    /// Pending messages whose retry budget is spent.
    pub failed_messages: u64,
}

/// Health summary derived from [`OutboxStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxHealth {
    pub status: &'static str,
    pub pending_messages: u64,
    pub failed_messages: u64,
    pub message: &'static str,
}

impl OutboxHealth {
    pub fn from_stats(stats: &OutboxStats) -> Self {
        let warning = stats.pending_messages >= HEALTH_PENDING_THRESHOLD;
        Self {
            status: if warning { "warning" } else { "healthy" },
            pending_messages: stats.pending_messages,
            failed_messages: stats.failed_messages,
            message: if warning {
                "High number of pending messages"
            } else {
                "Outbox is operating normally"
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
