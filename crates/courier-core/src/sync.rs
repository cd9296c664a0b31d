use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settings key holding the watermark of the last successful sync.
pub const LAST_SUCCESSFUL_SYNC_KEY: &str = "last_successful_sync";

/// Outcome of one sync run. One row per run, finalized in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub new_events_count: u32,
    pub updated_events_count: u32,
    pub is_success: bool,
    pub error_message: String,
}

impl SyncResult {
    /// A fresh, unfinished run.
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            new_events_count: 0,
            updated_events_count: 0,
            is_success: false,
            error_message: String::new(),
        }
    }

    /// Finalize after merging. Any error taints the run.
    pub fn complete(
        &mut self,
        finished_at: DateTime<Utc>,
        new_events: u32,
        updated_events: u32,
        errors: &[String],
    ) {
        self.finished_at = Some(finished_at.max(self.started_at));
        self.new_events_count = new_events;
        self.updated_events_count = updated_events;
        self.is_success = errors.is_empty();
        self.error_message = errors.join("\n");
    }

    /// Finalize after a run-level failure.
    pub fn fail(&mut self, finished_at: DateTime<Utc>, error: impl std::fmt::Display) {
        self.finished_at = Some(finished_at.max(self.started_at));
        self.is_success = false;
        self.error_message = error.to_string();
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// A key-value sync setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSetting {
    pub key: String,
    pub value: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
