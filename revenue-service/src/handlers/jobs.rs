//! Scheduled job triggers.
//!
//! Invoked by an external cron-style scheduler at most once per calendar
//! period, behind the shared-secret bearer middleware. All of them are
//! idempotent: re-running inside the same period changes nothing.

use crate::models::PeriodKey;
use crate::services::scheduler::RunSummary;
use crate::services::{InstallmentScheduler, InvoiceLifecycle, ReportCacheSink, SyncQueue};
use crate::startup::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct MonthlyRunRequest {
    pub org_id: Uuid,
    /// Period to process; defaults to the current calendar month.
    pub period: Option<PeriodKey>,
}

/// POST /jobs/monthly-run
///
/// Runs the installment scheduler for one org and period.
pub async fn monthly_run(
    State(state): State<AppState>,
    Json(req): Json<MonthlyRunRequest>,
) -> Result<Json<RunSummary>, AppError> {
    let today = Utc::now().date_naive();
    let period = req.period.unwrap_or_else(|| PeriodKey::from_date(today));

    let scheduler = InstallmentScheduler::new(state.db.clone(), state.cache.clone());
    let summary = scheduler.run_monthly(req.org_id, period, today).await?;

    tracing::info!(
        org_id = %req.org_id,
        period = %period,
        processed = summary.processed,
        created = summary.created,
        errors = summary.errors,
        "Monthly run finished"
    );

    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct OverdueSweepRequest {
    pub org_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct OverdueSweepResponse {
    pub swept: u64,
}

/// POST /jobs/overdue-sweep
///
/// Nightly: every open invoice past its due date becomes overdue.
pub async fn overdue_sweep(
    State(state): State<AppState>,
    Json(req): Json<OverdueSweepRequest>,
) -> Result<Json<OverdueSweepResponse>, AppError> {
    let lifecycle = InvoiceLifecycle::new(state.db.clone(), state.cache.clone());
    let swept = lifecycle
        .sweep_overdue(req.org_id, Utc::now().date_naive())
        .await?;
    Ok(Json(OverdueSweepResponse { swept }))
}

#[derive(Debug, Serialize)]
pub struct SyncDrainResponse {
    pub applied: u32,
    pub rescheduled: u32,
    pub failed: u32,
}

/// POST /jobs/sync-drain
///
/// Applies due downstream sync tasks against the report cache sink.
pub async fn sync_drain(
    State(state): State<AppState>,
) -> Result<Json<SyncDrainResponse>, AppError> {
    let queue = SyncQueue::new(state.db.clone());
    let sink = ReportCacheSink::new(state.cache.clone());
    let summary = queue.drain(&sink, 100).await?;
    Ok(Json(SyncDrainResponse {
        applied: summary.applied,
        rescheduled: summary.rescheduled,
        failed: summary.failed,
    }))
}
