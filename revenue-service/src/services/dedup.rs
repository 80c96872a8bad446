//! Revenue deduplication engine.
//!
//! Merges ledger entries and payments into a single recognized-income
//! figure, counting each economic event exactly once. Ledger entries are
//! the canonical accounting record; payments are settlement records that
//! may arrive with or without a matching ledger row. The rule is "ledger
//! wins, payments fill gaps": a payment whose invoice is already
//! represented by a ledger entry is skipped entirely.
//!
//! Recognition itself is pure and deterministic; the service at the bottom
//! wraps it with repository reads and the report cache.

use crate::models::{
    EntryStatus, EntryType, LedgerEntry, LedgerEntryFilter, Payment, PeriodKey,
};
use crate::services::cache::{ReportCache, ReportKind};
use crate::services::Database;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Closed view over the two record kinds that can carry revenue. The
/// engine operates over this sum type only, never over raw rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevenueRecord {
    Ledger {
        id: Uuid,
        invoice_id: Option<Uuid>,
        amount: Decimal,
    },
    Payment {
        id: Uuid,
        invoice_id: Option<Uuid>,
        amount: Decimal,
    },
}

impl RevenueRecord {
    /// Income ledger rows only; expense rows have no place in recognition.
    pub fn from_entry(entry: &LedgerEntry) -> Option<Self> {
        if entry.parsed_type() != EntryType::Income {
            return None;
        }
        Some(RevenueRecord::Ledger {
            id: entry.entry_id,
            invoice_id: entry.invoice_id,
            amount: entry.amount,
        })
    }

    pub fn from_payment(payment: &Payment) -> Self {
        RevenueRecord::Payment {
            id: payment.payment_id,
            invoice_id: payment.invoice_id,
            amount: payment.amount,
        }
    }

    /// Grouping key: shared `inv:` key when linked to an invoice, a
    /// per-record fallback otherwise.
    pub fn dedup_key(&self) -> String {
        match self {
            RevenueRecord::Ledger { id, invoice_id, .. } => match invoice_id {
                Some(inv) => format!("inv:{}", inv),
                None => format!("fin:{}", id),
            },
            RevenueRecord::Payment { id, invoice_id, .. } => match invoice_id {
                Some(inv) => format!("inv:{}", inv),
                None => format!("pay:{}", id),
            },
        }
    }
}

/// Result of a recognition pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedRevenue {
    /// Total recognized income.
    pub income: Decimal,
    /// Per-key amounts, for auditing which record won each key.
    pub by_key: BTreeMap<String, Decimal>,
    /// Payments skipped because a ledger entry already carried their invoice.
    pub skipped_payments: Vec<Uuid>,
}

/// Compute recognized income over a period's records.
///
/// Ledger entries seed the key map regardless of input order; payments are
/// then walked and either skipped (key already present) or added under
/// their own key.
pub fn recognize_income(records: &[RevenueRecord]) -> RecognizedRevenue {
    let mut by_key: BTreeMap<String, Decimal> = BTreeMap::new();

    for record in records {
        if let RevenueRecord::Ledger { amount, .. } = record {
            *by_key.entry(record.dedup_key()).or_insert(Decimal::ZERO) += *amount;
        }
    }

    let mut skipped_payments = Vec::new();
    for record in records {
        if let RevenueRecord::Payment {
            id,
            invoice_id,
            amount,
        } = record
        {
            let key = record.dedup_key();
            if invoice_id.is_some() && by_key.contains_key(&key) {
                // A ledger entry already represents this invoice; adding the
                // payment would double-count the same economic event.
                skipped_payments.push(*id);
                continue;
            }
            *by_key.entry(key).or_insert(Decimal::ZERO) += *amount;
        }
    }

    let income = by_key.values().copied().sum();

    RecognizedRevenue {
        income,
        by_key,
        skipped_payments,
    }
}

/// Expense side: confirmed expense ledger rows only, payments never count.
pub fn expense_total(entries: &[LedgerEntry]) -> Decimal {
    entries
        .iter()
        .filter(|e| e.is_active() && e.is_confirmed() && e.parsed_type() == EntryType::Expense)
        .map(|e| e.amount)
        .sum()
}

/// One month's deduplicated financial picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueSummary {
    pub period: PeriodKey,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub skipped_payments: u32,
}

pub struct RevenueSummaryService {
    db: Arc<Database>,
    cache: Arc<ReportCache>,
}

impl RevenueSummaryService {
    pub fn new(db: Arc<Database>, cache: Arc<ReportCache>) -> Self {
        Self { db, cache }
    }

    /// Recognized income, expenses, and net for one month, served from the
    /// report cache when a fresh copy exists.
    #[instrument(skip(self), fields(org_id = %org_id, period = %period))]
    pub async fn monthly_summary(
        &self,
        org_id: Uuid,
        period: PeriodKey,
    ) -> Result<RevenueSummary, AppError> {
        let variant = period.to_string();

        if let Some(hit) = self.cache.get(org_id, ReportKind::MonthlySummary, &variant) {
            if let Ok(summary) = serde_json::from_value::<RevenueSummary>(hit) {
                return Ok(summary);
            }
        }

        let range = period.date_range();
        let filter = LedgerEntryFilter {
            status: Some(EntryStatus::Confirmed),
            from: Some(range.from),
            to: Some(range.to),
            ..Default::default()
        };
        let entries = self.db.find_ledger_entries(org_id, &filter).await?;
        let payments = self
            .db
            .find_paid_payments_in_range(org_id, range.from, range.to)
            .await?;

        let records: Vec<RevenueRecord> = entries
            .iter()
            .filter_map(RevenueRecord::from_entry)
            .chain(payments.iter().map(RevenueRecord::from_payment))
            .collect();

        let recognized = recognize_income(&records);
        let expense = expense_total(&entries);

        let summary = RevenueSummary {
            period,
            income: recognized.income,
            expense,
            net: recognized.income - expense,
            skipped_payments: recognized.skipped_payments.len() as u32,
        };

        if let Ok(value) = serde_json::to_value(&summary) {
            self.cache
                .put(org_id, ReportKind::MonthlySummary, &variant, value);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(invoice_id: Option<Uuid>, amount: i64) -> RevenueRecord {
        RevenueRecord::Ledger {
            id: Uuid::new_v4(),
            invoice_id,
            amount: Decimal::new(amount, 0),
        }
    }

    fn payment(invoice_id: Option<Uuid>, amount: i64) -> RevenueRecord {
        RevenueRecord::Payment {
            id: Uuid::new_v4(),
            invoice_id,
            amount: Decimal::new(amount, 0),
        }
    }

    #[test]
    fn test_count_once_for_shared_invoice() {
        let inv = Uuid::new_v4();
        let records = vec![ledger(Some(inv), 1200), payment(Some(inv), 600)];

        let result = recognize_income(&records);
        assert_eq!(result.income, Decimal::new(1200, 0));
        assert_eq!(result.skipped_payments.len(), 1);
    }

    #[test]
    fn test_payment_fills_gap_when_no_ledger_row() {
        let inv = Uuid::new_v4();
        let records = vec![ledger(None, 1000), payment(Some(inv), 600)];

        let result = recognize_income(&records);
        assert_eq!(result.income, Decimal::new(1600, 0));
        assert!(result.skipped_payments.is_empty());
    }

    #[test]
    fn test_parceled_invoice_scenario() {
        // Canonical mixed scenario: unlinked 1200 ledger row, a 1200 ledger row for
        // INV-1, and two 600 payments against INV-1. Expected total 2400,
        // both payments skipped.
        let inv1 = Uuid::new_v4();
        let records = vec![
            ledger(None, 1200),
            payment(Some(inv1), 600),
            payment(Some(inv1), 600),
            ledger(Some(inv1), 1200),
        ];

        let result = recognize_income(&records);
        assert_eq!(result.income, Decimal::new(2400, 0));
        assert_eq!(result.skipped_payments.len(), 2);
    }

    #[test]
    fn test_ledger_seeds_regardless_of_order() {
        // The ledger row arrives after the payment in the input; it must
        // still win the key.
        let inv = Uuid::new_v4();
        let forward = vec![ledger(Some(inv), 500), payment(Some(inv), 500)];
        let reversed = vec![payment(Some(inv), 500), ledger(Some(inv), 500)];

        assert_eq!(
            recognize_income(&forward).income,
            recognize_income(&reversed).income
        );
        assert_eq!(recognize_income(&reversed).skipped_payments.len(), 1);
    }

    #[test]
    fn test_unlinked_payments_each_count() {
        let records = vec![payment(None, 100), payment(None, 250)];
        let result = recognize_income(&records);
        assert_eq!(result.income, Decimal::new(350, 0));
    }

    #[test]
    fn test_two_ledger_rows_same_invoice_accumulate() {
        // Two ledger entries on one invoice share the key and sum; this is
        // the documented tie-break for partial ledger rows.
        let inv = Uuid::new_v4();
        let records = vec![ledger(Some(inv), 600), ledger(Some(inv), 600)];
        let result = recognize_income(&records);
        assert_eq!(result.income, Decimal::new(1200, 0));
        assert_eq!(result.by_key.len(), 1);
    }

    #[test]
    fn test_idempotent_over_same_input() {
        let inv = Uuid::new_v4();
        let records = vec![
            ledger(Some(inv), 800),
            payment(Some(inv), 400),
            payment(None, 90),
        ];
        let first = recognize_income(&records);
        let second = recognize_income(&records);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input() {
        let result = recognize_income(&[]);
        assert_eq!(result.income, Decimal::ZERO);
        assert!(result.by_key.is_empty());
    }
}
