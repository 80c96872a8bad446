//! Outbox row for downstream mirror/cache sync retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sync task status: pending until applied, failed once the retry ceiling
/// is reached (manual intervention required).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskStatus {
    Pending,
    Failed,
}

impl SyncTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTaskStatus::Pending => "pending",
            SyncTaskStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "failed" => SyncTaskStatus::Failed,
            _ => SyncTaskStatus::Pending,
        }
    }
}

/// A queued downstream write that must eventually apply or be flagged.
/// The primary ledger write has already succeeded before this row exists,
/// so a sync failure never rolls back financial state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncTask {
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub status: String,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl SyncTask {
    pub fn parsed_status(&self) -> SyncTaskStatus {
        SyncTaskStatus::from_string(&self.status)
    }
}
