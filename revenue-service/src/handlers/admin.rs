//! Operator endpoints: reconciliation and historical backfill.

use crate::models::PeriodKey;
use crate::services::{BackfillMode, BackfillReport, BackfillService, ReconcileReport, ReconciliationService};
use crate::startup::AppState;
use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ReconcileRequest {
    pub org_id: Uuid,
    #[validate(range(min = 2000, max = 2999))]
    pub year: i32,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    pub target_income: Option<Decimal>,
    pub target_expense: Option<Decimal>,
}

/// POST /admin/reconcile
///
/// Moves confirmed ledger entries from neighboring months into the
/// target month until the declared totals are met.
pub async fn reconcile(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReconcileReport>, AppError> {
    req.validate()?;

    for (name, target) in [
        ("target_income", req.target_income),
        ("target_expense", req.target_expense),
    ] {
        if let Some(t) = target {
            if t < Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "{name} must not be negative"
                )));
            }
        }
    }

    let period = PeriodKey::new(req.year, req.month).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Invalid period {}-{:02}", req.year, req.month))
    })?;

    let service = ReconciliationService::new(state.db.clone(), state.cache.clone());
    let report = service
        .reconcile(req.org_id, period, req.target_income, req.target_expense)
        .await?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct BackfillRequest {
    pub org_id: Uuid,
    /// "installments" or "legacy-finance".
    pub mode: String,
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /admin/backfill
///
/// Creates invoices (and payments for settled records) for historical
/// data that predates invoicing. Idempotent via notes markers.
pub async fn backfill(
    State(state): State<AppState>,
    Json(req): Json<BackfillRequest>,
) -> Result<Json<BackfillReport>, AppError> {
    let mode: BackfillMode = req
        .mode
        .parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let service = BackfillService::new(state.db.clone(), state.cache.clone());
    let report = service.run(req.org_id, mode, req.dry_run).await?;

    Ok(Json(report))
}
