//! Installment confirmation endpoint.

use crate::middleware::OrgContext;
use crate::services::scheduler::ConfirmSource;
use crate::services::InstallmentScheduler;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub installment_id: Uuid,
    pub entry_id: Uuid,
    pub amount: Decimal,
    pub entry_date: NaiveDate,
}

/// POST /installments/:id/confirm
///
/// Confirms a pending or late installment and records its income entry
/// in one transaction. Confirming twice is a conflict.
pub async fn confirm(
    State(state): State<AppState>,
    org: OrgContext,
    Path(installment_id): Path<Uuid>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let scheduler = InstallmentScheduler::new(state.db.clone(), state.cache.clone());
    let entry = scheduler
        .confirm_installment(org.org_id, installment_id, ConfirmSource::Api)
        .await?
        .ok_or_else(|| {
            // The API source reports already-confirmed as Conflict inside
            // the scheduler; None here means a lost race.
            AppError::Conflict(anyhow::anyhow!("Installment already confirmed"))
        })?;

    Ok(Json(ConfirmResponse {
        installment_id,
        entry_id: entry.entry_id,
        amount: entry.amount,
        entry_date: entry.entry_date,
    }))
}
