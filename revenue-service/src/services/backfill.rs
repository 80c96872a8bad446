//! Backfill: synthesize invoices and payments from legacy records.
//!
//! For installments and pre-invoicing ledger entries, creates the invoice
//! (and, when the source was already settled, a paid payment) that the
//! invoicing subsystem would have produced. Idempotency rests entirely on
//! a deterministic marker substring embedded in the synthetic invoice's
//! notes; marker formats must never collide across source kinds.

use crate::models::{
    CreateInvoice, CreateLineItem, CreatePayment, EntryType, InstallmentStatus, Invoice,
    InvoiceStatus, PaymentStatus, PeriodKey,
};
use crate::services::cache::{EntityKind, ReportCache};
use crate::services::metrics::BACKFILL_CREATED_TOTAL;
use crate::services::Database;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Which legacy record kind to backfill from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackfillMode {
    Installments,
    LegacyFinance,
}

impl FromStr for BackfillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installments" => Ok(BackfillMode::Installments),
            "legacy-finance" => Ok(BackfillMode::LegacyFinance),
            other => Err(format!("unknown backfill mode '{}'", other)),
        }
    }
}

/// Deterministic marker for one source record. The kind prefix keeps
/// marker spaces disjoint across source kinds.
pub fn marker(mode: BackfillMode, source_id: Uuid) -> String {
    match mode {
        BackfillMode::Installments => format!("installment:{}", source_id),
        BackfillMode::LegacyFinance => format!("legacy-finance:{}", source_id),
    }
}

/// Skip decision for one source: it is already represented when any
/// invoice's notes carry its marker. Running the same scan twice over the
/// same invoices therefore creates nothing the second time.
pub fn already_backfilled(invoices: &[Invoice], mode: BackfillMode, source_id: Uuid) -> bool {
    let marker = marker(mode, source_id);
    invoices.iter().any(|i| i.has_marker(&marker))
}

/// A normalized candidate row, whatever table it came from.
#[derive(Debug, Clone)]
pub struct BackfillSource {
    pub source_id: Uuid,
    pub client_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub settled: bool,
    pub description: String,
}

/// What one run did (or would do, under dry-run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub mode: Option<BackfillMode>,
    pub dry_run: bool,
    pub scanned: u32,
    pub created_invoices: u32,
    pub created_payments: u32,
    pub skipped: u32,
    pub errors: u32,
    pub details: Vec<String>,
}

pub struct BackfillService {
    db: Arc<Database>,
    cache: Arc<ReportCache>,
}

impl BackfillService {
    pub fn new(db: Arc<Database>, cache: Arc<ReportCache>) -> Self {
        Self { db, cache }
    }

    /// Run a backfill pass. Dry-run performs the same scan and marker
    /// search but writes nothing.
    #[instrument(skip(self), fields(org_id = %org_id, mode = ?mode, dry_run = dry_run))]
    pub async fn run(
        &self,
        org_id: Uuid,
        mode: BackfillMode,
        dry_run: bool,
    ) -> Result<BackfillReport, AppError> {
        let sources = self.collect_sources(org_id, mode).await?;
        let existing = if sources.is_empty() {
            Vec::new()
        } else {
            self.db.find_invoices_with_notes(org_id).await?
        };

        let mut report = BackfillReport {
            mode: Some(mode),
            dry_run,
            ..Default::default()
        };

        for source in &sources {
            report.scanned += 1;
            match self
                .process_source(org_id, mode, source, &existing, dry_run)
                .await
            {
                Ok(ProcessOutcome::Skipped) => report.skipped += 1,
                Ok(ProcessOutcome::Created { with_payment }) => {
                    report.created_invoices += 1;
                    if with_payment {
                        report.created_payments += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    report
                        .details
                        .push(format!("source {}: {}", source.source_id, e));
                    warn!(source_id = %source.source_id, error = %e, "Backfill item failed, continuing");
                }
            }
        }

        if !dry_run && report.created_invoices > 0 {
            self.cache.invalidate(org_id, EntityKind::Invoice);
            self.cache.invalidate(org_id, EntityKind::Payment);
            // Bulk creation is exactly what downstream mirrors must hear
            // about; enqueue failure never undoes the writes.
            if let Err(e) = self
                .db
                .enqueue_sync_task(
                    org_id,
                    "report_refresh",
                    serde_json::json!({ "entity_kind": "invoice" }),
                )
                .await
            {
                warn!(org_id = %org_id, error = %e, "Failed to enqueue downstream refresh");
            }
        }

        Ok(report)
    }

    async fn collect_sources(
        &self,
        org_id: Uuid,
        mode: BackfillMode,
    ) -> Result<Vec<BackfillSource>, AppError> {
        match mode {
            BackfillMode::Installments => {
                let installments = self.db.find_installments(org_id).await?;
                Ok(installments
                    .iter()
                    .map(|i| BackfillSource {
                        source_id: i.installment_id,
                        client_id: i.client_id,
                        amount: i.amount,
                        due_date: i.due_date,
                        settled: i.parsed_status() == InstallmentStatus::Confirmed,
                        description: format!("Parcela {}", i.number),
                    })
                    .collect())
            }
            BackfillMode::LegacyFinance => {
                let filter = crate::models::LedgerEntryFilter {
                    entry_type: Some(EntryType::Income),
                    ..Default::default()
                };
                let entries = self.db.find_ledger_entries(org_id, &filter).await?;
                Ok(entries
                    .iter()
                    // Entries already linked to an invoice need no synthesis.
                    .filter(|e| e.invoice_id.is_none() && e.client_id.is_some())
                    .map(|e| BackfillSource {
                        source_id: e.entry_id,
                        client_id: e.client_id.unwrap_or_default(),
                        amount: e.amount,
                        due_date: e.entry_date,
                        settled: e.is_confirmed(),
                        description: e.description.clone(),
                    })
                    .collect())
            }
        }
    }

    async fn process_source(
        &self,
        org_id: Uuid,
        mode: BackfillMode,
        source: &BackfillSource,
        existing: &[Invoice],
        dry_run: bool,
    ) -> Result<ProcessOutcome, AppError> {
        super::lifecycle::require_positive("amount", source.amount)?;

        if already_backfilled(existing, mode, source.source_id) {
            return Ok(ProcessOutcome::Skipped);
        }
        let marker = marker(mode, source.source_id);

        if dry_run {
            return Ok(ProcessOutcome::Created {
                with_payment: source.settled,
            });
        }

        let period = PeriodKey::from_date(source.due_date);
        let status = if source.settled {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Open
        };

        let invoice = self
            .db
            .create_invoice(&CreateInvoice {
                org_id,
                client_id: source.client_id,
                number: format!("BF-{}-{}", period, &source.source_id.simple().to_string()[..8]),
                status,
                issue_date: source.due_date,
                due_date: source.due_date,
                subtotal: source.amount,
                discount: Decimal::ZERO,
                tax: Decimal::ZERO,
                currency: "BRL".to_string(),
                notes: Some(format!("Backfilled from {} [{}]", source.description, marker)),
                items: vec![CreateLineItem {
                    description: source.description.clone(),
                    quantity: 1,
                    unit_amount: source.amount,
                }],
            })
            .await?;

        BACKFILL_CREATED_TOTAL
            .with_label_values(&["invoice"])
            .inc();

        if source.settled {
            self.db
                .create_payment(&CreatePayment {
                    org_id,
                    client_id: source.client_id,
                    invoice_id: Some(invoice.invoice_id),
                    amount: source.amount,
                    method: "backfill".to_string(),
                    status: PaymentStatus::Paid,
                    provider: None,
                    paid_at: Some(Utc::now()),
                })
                .await?;
            BACKFILL_CREATED_TOTAL
                .with_label_values(&["payment"])
                .inc();
        }

        Ok(ProcessOutcome::Created {
            with_payment: source.settled,
        })
    }
}

enum ProcessOutcome {
    Skipped,
    Created { with_payment: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_formats_never_collide() {
        let id = Uuid::new_v4();
        let a = marker(BackfillMode::Installments, id);
        let b = marker(BackfillMode::LegacyFinance, id);
        assert_ne!(a, b);
        assert!(a.starts_with("installment:"));
        assert!(b.starts_with("legacy-finance:"));
        // Neither marker is a substring of the other even for the same id.
        assert!(!a.contains(&b) && !b.contains(&a));
    }

    #[test]
    fn test_marker_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(
            marker(BackfillMode::Installments, id),
            marker(BackfillMode::Installments, id)
        );
    }

    fn invoice_with_notes(notes: &str) -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            number: "BF-2025-10-test".to_string(),
            status: "paid".to_string(),
            issue_date: chrono::NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            due_date: chrono::NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            subtotal: Decimal::new(100, 0),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::new(100, 0),
            currency: "BRL".to_string(),
            notes: Some(notes.to_string()),
            deleted_at: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_marked_source_is_skipped_on_rerun() {
        let id = Uuid::new_v4();
        let invoices = vec![invoice_with_notes(&format!(
            "Backfilled from Parcela 3 [{}]",
            marker(BackfillMode::Installments, id)
        ))];

        // The marker left by a previous run makes the source a skip; a
        // source never seen before still goes through.
        assert!(already_backfilled(
            &invoices,
            BackfillMode::Installments,
            id
        ));
        assert!(!already_backfilled(
            &invoices,
            BackfillMode::Installments,
            Uuid::new_v4()
        ));
    }

    #[test]
    fn test_marker_check_is_mode_scoped() {
        let id = Uuid::new_v4();
        let invoices = vec![invoice_with_notes(&format!(
            "Backfilled from x [{}]",
            marker(BackfillMode::Installments, id)
        ))];

        assert!(!already_backfilled(
            &invoices,
            BackfillMode::LegacyFinance,
            id
        ));
        assert!(!already_backfilled(&[], BackfillMode::Installments, id));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            "installments".parse::<BackfillMode>().unwrap(),
            BackfillMode::Installments
        );
        assert_eq!(
            "legacy-finance".parse::<BackfillMode>().unwrap(),
            BackfillMode::LegacyFinance
        );
        assert!("payments".parse::<BackfillMode>().is_err());
    }
}
