//! Invoice lifecycle endpoints.

use crate::middleware::OrgContext;
use crate::models::{Invoice, PeriodKey};
use crate::services::InvoiceLifecycle;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateMonthlyRequest {
    pub client_id: Uuid,
    pub period: PeriodKey,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            client_id: invoice.client_id,
            number: invoice.number,
            status: invoice.status,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            subtotal: invoice.subtotal,
            discount: invoice.discount,
            tax: invoice.tax,
            total: invoice.total,
            currency: invoice.currency,
            created_utc: invoice.created_utc,
        }
    }
}

/// POST /invoices/monthly
pub async fn create_monthly(
    State(state): State<AppState>,
    org: OrgContext,
    Json(req): Json<CreateMonthlyRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    let lifecycle = InvoiceLifecycle::new(state.db.clone(), state.cache.clone());
    let invoice = lifecycle
        .create_monthly(org.org_id, req.client_id, req.period, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// POST /invoices/:id/pay
pub async fn mark_paid(
    State(state): State<AppState>,
    org: OrgContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let lifecycle = InvoiceLifecycle::new(state.db.clone(), state.cache.clone());
    let invoice = lifecycle.mark_paid(org.org_id, invoice_id).await?;
    Ok(Json(invoice.into()))
}

/// POST /invoices/:id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    org: OrgContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let lifecycle = InvoiceLifecycle::new(state.db.clone(), state.cache.clone());
    let invoice = lifecycle.cancel(org.org_id, invoice_id).await?;
    Ok(Json(invoice.into()))
}
