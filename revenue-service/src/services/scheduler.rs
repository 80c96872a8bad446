//! Installment scheduler and monthly billing job.
//!
//! Runs once per calendar period per org. Installment clients get their
//! due installments swept (pending past due becomes late); flat-contract
//! clients get their monthly income entry, guarded by a check-before-create
//! so reruns inside the same period never duplicate income rows.

use crate::models::{
    BillingClient, CreateLedgerEntry, EntryStatus, EntryType, Installment, InstallmentStatus,
    LedgerEntry, PeriodKey,
};
use crate::services::cache::{EntityKind, ReportCache};
use crate::services::metrics::{LEDGER_ENTRIES_TOTAL, SCHEDULER_CLIENTS_TOTAL};
use crate::services::Database;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Category for installment income entries.
pub const INSTALLMENT_CATEGORY: &str = "Parcelas";
/// Category for flat monthly income entries.
pub const MONTHLY_CATEGORY: &str = "Mensalidade";

/// Who is asking for a confirmation: the batch job tolerates an already
/// confirmed installment, the direct API does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmSource {
    Scheduler,
    Api,
}

/// Summary returned to the external scheduler trigger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: u32,
    pub created: u32,
    pub errors: u32,
    pub details: Vec<String>,
}

/// Description for a flat monthly income entry.
pub fn monthly_description(period: PeriodKey, client_name: &str) -> String {
    format!("{} {} - {}", MONTHLY_CATEGORY, period, client_name)
}

/// SQL LIKE pattern matching any monthly entry for the period, whatever
/// the client name was at creation time.
pub fn monthly_description_pattern(period: PeriodKey) -> String {
    format!("{} {} - %", MONTHLY_CATEGORY, period)
}

/// Description for an installment income entry.
pub fn installment_description(installment: &Installment, client_name: &str) -> String {
    format!(
        "Parcela {} - {}",
        installment.number, client_name
    )
}

pub struct InstallmentScheduler {
    db: Arc<Database>,
    cache: Arc<ReportCache>,
}

impl InstallmentScheduler {
    pub fn new(db: Arc<Database>, cache: Arc<ReportCache>) -> Self {
        Self { db, cache }
    }

    /// Monthly run for one org. Per-client failures are counted and
    /// logged; a single bad record never aborts the run.
    #[instrument(skip(self), fields(org_id = %org_id, period = %period))]
    pub async fn run_monthly(
        &self,
        org_id: Uuid,
        period: PeriodKey,
        today: NaiveDate,
    ) -> Result<RunSummary, AppError> {
        let clients = self.db.find_billing_clients(org_id).await?;
        let mut summary = RunSummary::default();

        for client in &clients {
            summary.processed += 1;
            SCHEDULER_CLIENTS_TOTAL
                .with_label_values(&["processed"])
                .inc();

            let result = if client.is_installment {
                self.process_installment_client(org_id, client, period, today)
                    .await
            } else {
                self.process_monthly_client(org_id, client, period).await
            };

            match result {
                Ok(created) => summary.created += created,
                Err(e) => {
                    summary.errors += 1;
                    summary
                        .details
                        .push(format!("client {}: {}", client.client_id, e));
                    SCHEDULER_CLIENTS_TOTAL.with_label_values(&["error"]).inc();
                    warn!(
                        client_id = %client.client_id,
                        error = %e,
                        "Monthly run failed for client, continuing"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Installment client: sweep the period's installments, flipping
    /// pending-past-due rows to late. Confirmation stays a user action.
    async fn process_installment_client(
        &self,
        org_id: Uuid,
        client: &BillingClient,
        period: PeriodKey,
        today: NaiveDate,
    ) -> Result<u32, AppError> {
        let range = period.date_range();
        let installments = self
            .db
            .find_installments_due(org_id, client.client_id, range.from, range.to)
            .await?;

        for installment in &installments {
            if installment.is_past_due(today) {
                self.db
                    .mark_installment_late(org_id, installment.installment_id)
                    .await?;
            }
        }

        Ok(0)
    }

    /// Flat-contract client: create the month's income entry unless one
    /// already exists. The existence check is the idempotency guard.
    async fn process_monthly_client(
        &self,
        org_id: Uuid,
        client: &BillingClient,
        period: PeriodKey,
    ) -> Result<u32, AppError> {
        if client.contract_value <= rust_decimal::Decimal::ZERO {
            return Ok(0);
        }

        let range = period.date_range();
        let exists = self
            .db
            .monthly_entry_exists(
                org_id,
                client.client_id,
                range.from,
                range.to,
                &monthly_description_pattern(period),
            )
            .await?;
        if exists {
            return Ok(0);
        }

        let entry_date = period.clamp_day(client.payment_day.max(1) as u32);
        self.db
            .create_ledger_entry(&CreateLedgerEntry {
                org_id,
                client_id: Some(client.client_id),
                entry_type: EntryType::Income,
                subtype: Some("monthly".to_string()),
                amount: client.contract_value,
                description: monthly_description(period, &client.name),
                category: MONTHLY_CATEGORY.to_string(),
                entry_date,
                invoice_id: None,
                status: EntryStatus::Confirmed,
            })
            .await?;

        LEDGER_ENTRIES_TOTAL
            .with_label_values(&["income", MONTHLY_CATEGORY])
            .inc();
        SCHEDULER_CLIENTS_TOTAL.with_label_values(&["created"]).inc();
        self.cache.invalidate(org_id, EntityKind::LedgerEntry);

        Ok(1)
    }

    /// Confirm one installment: atomically set confirmed + paid_at and
    /// emit exactly one income entry (category "Parcelas").
    ///
    /// Already-confirmed is a benign no-op for the scheduler and a hard
    /// conflict for the direct API.
    #[instrument(skip(self), fields(org_id = %org_id, installment_id = %installment_id))]
    pub async fn confirm_installment(
        &self,
        org_id: Uuid,
        installment_id: Uuid,
        source: ConfirmSource,
    ) -> Result<Option<LedgerEntry>, AppError> {
        let installment = self
            .db
            .find_installment(org_id, installment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Installment not found")))?;

        if installment.parsed_status() == InstallmentStatus::Confirmed {
            return match source {
                ConfirmSource::Scheduler => Ok(None),
                ConfirmSource::Api => Err(AppError::Conflict(anyhow::anyhow!(
                    "Installment {} already confirmed",
                    installment.number
                ))),
            };
        }

        let client = self
            .db
            .find_client(org_id, installment.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

        let now = Utc::now();
        let entry = CreateLedgerEntry {
            org_id,
            client_id: Some(installment.client_id),
            entry_type: EntryType::Income,
            subtype: Some("installment".to_string()),
            amount: installment.amount,
            description: installment_description(&installment, &client.name),
            category: INSTALLMENT_CATEGORY.to_string(),
            entry_date: now.date_naive(),
            invoice_id: None,
            status: EntryStatus::Confirmed,
        };

        let created = self
            .db
            .confirm_installment(org_id, installment_id, now, &entry)
            .await?;

        match created {
            Some(ledger_entry) => {
                LEDGER_ENTRIES_TOTAL
                    .with_label_values(&["income", INSTALLMENT_CATEGORY])
                    .inc();
                self.cache.invalidate(org_id, EntityKind::Installment);
                self.cache.invalidate(org_id, EntityKind::LedgerEntry);
                Ok(Some(ledger_entry))
            }
            // Lost the race to a concurrent confirmation.
            None => match source {
                ConfirmSource::Scheduler => Ok(None),
                ConfirmSource::Api => Err(AppError::Conflict(anyhow::anyhow!(
                    "Installment already confirmed"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn installment(number: i32, status: &str, due: NaiveDate) -> Installment {
        Installment {
            installment_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            number,
            amount: Decimal::new(50000, 2),
            due_date: due,
            status: status.to_string(),
            paid_at: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_monthly_description_matches_pattern() {
        let period = PeriodKey::new(2025, 11).unwrap();
        let description = monthly_description(period, "Acme Ltda");
        let pattern = monthly_description_pattern(period);

        // LIKE-pattern prefix (everything before '%') must prefix the
        // concrete description, or the idempotency guard breaks.
        let prefix = pattern.trim_end_matches('%');
        assert!(description.starts_with(prefix));
    }

    #[test]
    fn test_patterns_differ_across_periods() {
        let a = monthly_description_pattern(PeriodKey::new(2025, 11).unwrap());
        let b = monthly_description_pattern(PeriodKey::new(2025, 12).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_past_due_detection() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let due_earlier = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();

        assert!(installment(1, "pending", due_earlier).is_past_due(today));
        assert!(!installment(1, "late", due_earlier).is_past_due(today));
        assert!(!installment(1, "confirmed", due_earlier).is_past_due(today));
        assert!(!installment(1, "pending", today).is_past_due(today));
    }

    #[test]
    fn test_installment_description_names_number_and_client() {
        let inst = installment(3, "pending", NaiveDate::from_ymd_opt(2025, 11, 5).unwrap());
        let description = installment_description(&inst, "Acme Ltda");
        assert!(description.contains('3'));
        assert!(description.contains("Acme Ltda"));
    }
}
