//! Invoice lifecycle manager.
//!
//! Owns every status transition; the transition table itself lives on
//! `InvoiceStatus`. Terminal states never regress through this API.

use crate::models::{
    CreateInvoice, CreateLineItem, CreatePayment, Invoice, InvoiceStatus, PaymentStatus,
    PeriodKey,
};
use crate::services::cache::{EntityKind, ReportCache};
use crate::services::metrics::INVOICE_TRANSITIONS_TOTAL;
use crate::services::Database;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Field-level guard for money inputs: non-positive amounts are a
/// validation failure, not a malformed request.
pub(crate) fn require_positive(field: &'static str, amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        let mut errors = validator::ValidationErrors::new();
        let mut error = validator::ValidationError::new("positive");
        error.message = Some(format!("{} must be positive, got {}", field, amount).into());
        errors.add(field, error);
        return Err(errors.into());
    }
    Ok(())
}

pub struct InvoiceLifecycle {
    db: Arc<Database>,
    cache: Arc<ReportCache>,
}

impl InvoiceLifecycle {
    pub fn new(db: Arc<Database>, cache: Arc<ReportCache>) -> Self {
        Self { db, cache }
    }

    /// Create the monthly invoice for a client: one line, dated to the
    /// first day of the period, immediately open.
    ///
    /// Duplicate detection goes by due-date range, not by number: two
    /// invoices for the same client whose due dates share a period are the
    /// same economic document regardless of numbering.
    #[instrument(skip(self), fields(org_id = %org_id, client_id = %client_id, period = %period))]
    pub async fn create_monthly(
        &self,
        org_id: Uuid,
        client_id: Uuid,
        period: PeriodKey,
        amount: Decimal,
    ) -> Result<Invoice, AppError> {
        require_positive("amount", amount)?;

        let client = self
            .db
            .find_client(org_id, client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

        let range = period.date_range();
        if let Some(existing) = self
            .db
            .find_invoice_by_due_range(org_id, client_id, range.from, range.to)
            .await?
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} already exists for client in period {}",
                existing.number,
                period
            )));
        }

        let issue_date = period.first_day();
        let due_date = period.clamp_day(client.payment_day.max(1) as u32);
        let number = format!(
            "{}-{}-{}",
            period,
            &client_id.simple().to_string()[..8],
            Utc::now().timestamp()
        );

        let invoice = self
            .db
            .create_invoice(&CreateInvoice {
                org_id,
                client_id,
                number,
                status: InvoiceStatus::Open,
                issue_date,
                due_date,
                subtotal: amount,
                discount: Decimal::ZERO,
                tax: Decimal::ZERO,
                currency: "BRL".to_string(),
                notes: None,
                items: vec![CreateLineItem {
                    description: format!("Mensalidade {} - {}", period, client.name),
                    quantity: 1,
                    unit_amount: amount,
                }],
            })
            .await?;

        INVOICE_TRANSITIONS_TOTAL
            .with_label_values(&["open"])
            .inc();
        self.cache.invalidate(org_id, EntityKind::Invoice);

        Ok(invoice)
    }

    /// Mark an invoice paid. Valid from open or overdue; creates the
    /// settling payment when none exists yet.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn mark_paid(&self, org_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.require_invoice(org_id, invoice_id).await?;
        let from = invoice.parsed_status();

        if !from.can_transition(InvoiceStatus::Paid) {
            return Err(invalid_transition(from, InvoiceStatus::Paid));
        }

        let payments = self.db.find_payments_for_invoice(org_id, invoice_id).await?;
        if !payments.iter().any(|p| p.is_paid()) {
            self.db
                .create_payment(&CreatePayment {
                    org_id,
                    client_id: invoice.client_id,
                    invoice_id: Some(invoice_id),
                    amount: invoice.total,
                    method: "manual".to_string(),
                    status: PaymentStatus::Paid,
                    provider: None,
                    paid_at: Some(Utc::now()),
                })
                .await?;
            self.cache.invalidate(org_id, EntityKind::Payment);
        }

        let updated = self
            .db
            .update_invoice_status(org_id, invoice_id, from, InvoiceStatus::Paid)
            .await?;
        if !updated {
            // Status changed under us between the read and the update.
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice status changed concurrently"
            )));
        }

        INVOICE_TRANSITIONS_TOTAL
            .with_label_values(&["paid"])
            .inc();
        self.cache.invalidate(org_id, EntityKind::Invoice);

        info!(invoice_id = %invoice_id, "Invoice marked paid");
        self.require_invoice(org_id, invoice_id).await
    }

    /// Cancel (void) an invoice. Rejected when any paid payment exists.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn cancel(&self, org_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.require_invoice(org_id, invoice_id).await?;
        let from = invoice.parsed_status();

        if !from.can_transition(InvoiceStatus::Void) {
            return Err(invalid_transition(from, InvoiceStatus::Void));
        }

        let payments = self.db.find_payments_for_invoice(org_id, invoice_id).await?;
        if payments.iter().any(|p| p.is_paid()) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Cannot cancel invoice with paid payments; void requires administrative correction"
            )));
        }

        let updated = self
            .db
            .update_invoice_status(org_id, invoice_id, from, InvoiceStatus::Void)
            .await?;
        if !updated {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice status changed concurrently"
            )));
        }

        INVOICE_TRANSITIONS_TOTAL
            .with_label_values(&["void"])
            .inc();
        self.cache.invalidate(org_id, EntityKind::Invoice);

        info!(invoice_id = %invoice_id, "Invoice voided");
        self.require_invoice(org_id, invoice_id).await
    }

    /// Nightly sweep: open invoices past due become overdue. Re-running
    /// changes nothing for invoices already overdue or beyond.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn sweep_overdue(
        &self,
        org_id: Uuid,
        today: chrono::NaiveDate,
    ) -> Result<u64, AppError> {
        let swept = self.db.sweep_overdue(org_id, today).await?;
        if swept > 0 {
            INVOICE_TRANSITIONS_TOTAL
                .with_label_values(&["overdue"])
                .inc_by(swept);
            self.cache.invalidate(org_id, EntityKind::Invoice);
            info!(org_id = %org_id, swept = swept, "Overdue sweep moved invoices");
        }
        Ok(swept)
    }

    async fn require_invoice(&self, org_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.db
            .find_invoice(org_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }
}

fn invalid_transition(from: InvoiceStatus, to: InvoiceStatus) -> AppError {
    AppError::Conflict(anyhow::anyhow!(
        "Invalid invoice transition {} -> {}",
        from.as_str(),
        to.as_str()
    ))
}
