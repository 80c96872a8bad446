//! Downstream sync queue.
//!
//! Mirror/cache writes that fail transiently are queued here instead of
//! surfacing to the caller: the primary ledger write has already
//! succeeded, so a sync failure must never roll back financial state.
//! Tasks retry with backoff up to the policy ceiling, then stay marked
//! failed for manual intervention.

use crate::models::{SyncTask, SyncTaskStatus};
use crate::services::cache::{EntityKind, ReportCache};
use crate::services::metrics::SYNC_TASKS_TOTAL;
use crate::services::Database;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// A downstream target the queue applies tasks to.
#[async_trait]
pub trait SyncSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn apply(&self, task: &SyncTask) -> Result<(), AppError>;
}

/// Sink that refreshes the report cache: a task's payload names the org
/// and entity kind whose derived reports must be dropped.
pub struct ReportCacheSink {
    cache: Arc<ReportCache>,
}

impl ReportCacheSink {
    pub fn new(cache: Arc<ReportCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SyncSink for ReportCacheSink {
    fn name(&self) -> &'static str {
        "report-cache"
    }

    async fn apply(&self, task: &SyncTask) -> Result<(), AppError> {
        let kind = task
            .payload
            .get("entity_kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Sync payload missing entity_kind"))
            })?;
        let entity = match kind {
            "invoice" => EntityKind::Invoice,
            "payment" => EntityKind::Payment,
            "ledger_entry" => EntityKind::LedgerEntry,
            "installment" => EntityKind::Installment,
            other => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unknown entity kind '{}'",
                    other
                )))
            }
        };
        self.cache.invalidate(task.org_id, entity);
        Ok(())
    }
}

/// What to do with a task after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    RetryAt(DateTime<Utc>),
    PermanentlyFailed,
}

/// Decide the disposition for a task that just failed its `attempts`-th
/// attempt. Pure; the drain loop persists the outcome.
pub fn after_failure(
    attempts: i32,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> FailureDisposition {
    if attempts >= policy.max_attempts as i32 {
        FailureDisposition::PermanentlyFailed
    } else {
        let backoff = policy.backoff_duration(attempts.saturating_sub(1) as u32);
        let delay = ChronoDuration::from_std(backoff).unwrap_or(ChronoDuration::seconds(1));
        FailureDisposition::RetryAt(now + delay)
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainSummary {
    pub applied: u32,
    pub rescheduled: u32,
    pub failed: u32,
}

pub struct SyncQueue {
    db: Arc<Database>,
    policy: RetryPolicy,
}

impl SyncQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            policy: RetryPolicy::sync_mirror(),
        }
    }

    /// Queue a downstream write. Called after the primary write committed.
    #[instrument(skip(self, payload), fields(org_id = %org_id, kind = kind))]
    pub async fn enqueue(
        &self,
        org_id: Uuid,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<SyncTask, AppError> {
        self.db.enqueue_sync_task(org_id, kind, payload).await
    }

    /// Apply due tasks against the sink. Per-task errors reschedule or
    /// permanently fail that task only; the pass always completes.
    #[instrument(skip(self, sink))]
    pub async fn drain(&self, sink: &dyn SyncSink, limit: i64) -> Result<DrainSummary, AppError> {
        let tasks = self.db.due_sync_tasks(limit).await?;
        let mut summary = DrainSummary::default();

        for task in tasks {
            match sink.apply(&task).await {
                Ok(()) => {
                    self.db.complete_sync_task(task.task_id).await?;
                    SYNC_TASKS_TOTAL.with_label_values(&["applied"]).inc();
                    summary.applied += 1;
                }
                Err(e) => {
                    let attempts = task.attempts + 1;
                    let now = Utc::now();
                    match after_failure(attempts, &self.policy, now) {
                        FailureDisposition::RetryAt(next) => {
                            self.db
                                .record_sync_failure(
                                    task.task_id,
                                    attempts,
                                    &e.to_string(),
                                    SyncTaskStatus::Pending,
                                    next,
                                )
                                .await?;
                            SYNC_TASKS_TOTAL.with_label_values(&["retried"]).inc();
                            summary.rescheduled += 1;
                        }
                        FailureDisposition::PermanentlyFailed => {
                            self.db
                                .record_sync_failure(
                                    task.task_id,
                                    attempts,
                                    &e.to_string(),
                                    SyncTaskStatus::Failed,
                                    now,
                                )
                                .await?;
                            SYNC_TASKS_TOTAL.with_label_values(&["failed"]).inc();
                            summary.failed += 1;
                            warn!(
                                task_id = %task.task_id,
                                sink = sink.name(),
                                attempts = attempts,
                                "Sync task permanently failed, manual intervention required"
                            );
                        }
                    }
                }
            }
        }

        Ok(summary)
    }
}
