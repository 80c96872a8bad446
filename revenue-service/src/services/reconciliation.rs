//! Monthly reconciliation: date-shifting repair of historical drift.
//!
//! Moves the *dates* of confirmed ledger entries into a target month until
//! that month's totals reach an externally supplied target. Amounts are
//! never touched, and every move is reported back to the caller; nothing
//! here applies silently. Moves run sequentially outside one transaction
//! by design: partial progress is itself useful and auditable.

use crate::models::{EntryType, LedgerEntry, PeriodKey};
use crate::services::cache::{EntityKind, ReportCache};
use crate::services::metrics::RECONCILE_MOVES_TOTAL;
use crate::services::Database;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Candidate search window outside the target month.
const WINDOW_DAYS: u64 = 31;

/// One applied (or planned) date move.
#[derive(Debug, Clone, Serialize)]
pub struct MovedRecord {
    pub id: Uuid,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

/// Before/after view of one side (income or expense).
#[derive(Debug, Clone, Serialize)]
pub struct SideReport {
    pub entry_type: EntryType,
    pub target: Decimal,
    pub before: Decimal,
    pub after: Decimal,
    pub moved: Vec<MovedRecord>,
    pub errors: Vec<String>,
}

/// Full reconciliation report returned to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub org_id: Uuid,
    pub period: PeriodKey,
    pub income: Option<SideReport>,
    pub expense: Option<SideReport>,
}

/// Plan which candidates to move for one side. Pure: ordering and the
/// stop condition live here, away from any I/O.
///
/// Candidates must already be sorted oldest-first then largest-amount-first
/// (the repository query guarantees it; sorted again here so the plan is
/// correct for any caller). Overshoot is accepted: a record larger than
/// the remaining shortfall still moves whole, since amounts are immutable.
pub fn plan_moves(
    target: Decimal,
    current: Decimal,
    candidates: &[LedgerEntry],
    period: PeriodKey,
) -> Vec<MovedRecord> {
    let mut shortfall = target - current;
    if shortfall <= Decimal::ZERO {
        return Vec::new();
    }

    let mut ordered: Vec<&LedgerEntry> = candidates.iter().collect();
    ordered.sort_by(|a, b| {
        a.entry_date
            .cmp(&b.entry_date)
            .then(b.amount.cmp(&a.amount))
    });

    let mut moves = Vec::new();
    for entry in ordered {
        if shortfall <= Decimal::ZERO {
            break;
        }
        moves.push(MovedRecord {
            id: entry.entry_id,
            entry_type: entry.parsed_type(),
            amount: entry.amount,
            from_date: entry.entry_date,
            to_date: period.clamp_day(chrono::Datelike::day(&entry.entry_date)),
        });
        shortfall -= entry.amount;
    }

    moves
}

pub struct ReconciliationService {
    db: Arc<Database>,
    cache: Arc<ReportCache>,
}

impl ReconciliationService {
    pub fn new(db: Arc<Database>, cache: Arc<ReportCache>) -> Self {
        Self { db, cache }
    }

    /// Reconcile one month toward the supplied targets. Sides without a
    /// target are left untouched and reported as `None`.
    #[instrument(skip(self), fields(org_id = %org_id, period = %period))]
    pub async fn reconcile(
        &self,
        org_id: Uuid,
        period: PeriodKey,
        target_income: Option<Decimal>,
        target_expense: Option<Decimal>,
    ) -> Result<ReconcileReport, AppError> {
        let income = match target_income {
            Some(target) => Some(
                self.reconcile_side(org_id, period, EntryType::Income, target)
                    .await?,
            ),
            None => None,
        };
        let expense = match target_expense {
            Some(target) => Some(
                self.reconcile_side(org_id, period, EntryType::Expense, target)
                    .await?,
            ),
            None => None,
        };

        if income.as_ref().is_some_and(|s| !s.moved.is_empty())
            || expense.as_ref().is_some_and(|s| !s.moved.is_empty())
        {
            self.cache.invalidate(org_id, EntityKind::LedgerEntry);
            // Downstream mirrors refresh asynchronously; a failed enqueue
            // never undoes the moves already applied.
            if let Err(e) = self
                .db
                .enqueue_sync_task(
                    org_id,
                    "report_refresh",
                    serde_json::json!({ "entity_kind": "ledger_entry" }),
                )
                .await
            {
                warn!(org_id = %org_id, error = %e, "Failed to enqueue downstream refresh");
            }
        }

        Ok(ReconcileReport {
            org_id,
            period,
            income,
            expense,
        })
    }

    async fn reconcile_side(
        &self,
        org_id: Uuid,
        period: PeriodKey,
        entry_type: EntryType,
        target: Decimal,
    ) -> Result<SideReport, AppError> {
        let range = period.date_range();
        let before = self
            .db
            .sum_confirmed_entries(org_id, entry_type, range.from, range.to)
            .await?;

        if target <= before {
            return Ok(SideReport {
                entry_type,
                target,
                before,
                after: before,
                moved: Vec::new(),
                errors: Vec::new(),
            });
        }

        let window_from = range.from - Days::new(WINDOW_DAYS);
        let window_to = range.to + Days::new(WINDOW_DAYS);
        let candidates = self
            .db
            .find_move_candidates(
                org_id,
                entry_type,
                window_from,
                window_to,
                range.from,
                range.to,
            )
            .await?;

        let plan = plan_moves(target, before, &candidates, period);

        // Best-effort apply: one failed move is logged and skipped; the
        // report tells the operator exactly what did and did not happen.
        let mut moved = Vec::new();
        let mut errors = Vec::new();
        for planned in plan {
            match self
                .db
                .update_entry_date(org_id, planned.id, planned.to_date)
                .await
            {
                Ok(true) => {
                    RECONCILE_MOVES_TOTAL
                        .with_label_values(&[entry_type.as_str()])
                        .inc();
                    moved.push(planned);
                }
                Ok(false) => {
                    errors.push(format!("entry {} vanished before move", planned.id));
                }
                Err(e) => {
                    warn!(entry_id = %planned.id, error = %e, "Move failed, continuing");
                    errors.push(format!("entry {}: {}", planned.id, e));
                }
            }
        }

        let after = self
            .db
            .sum_confirmed_entries(org_id, entry_type, range.from, range.to)
            .await?;

        info!(
            entry_type = entry_type.as_str(),
            before = %before,
            after = %after,
            target = %target,
            moves = moved.len(),
            "Reconciliation side finished"
        );

        Ok(SideReport {
            entry_type,
            target,
            before,
            after,
            moved,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(amount: i64, date: NaiveDate) -> LedgerEntry {
        LedgerEntry {
            entry_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            client_id: None,
            entry_type: "income".to_string(),
            subtype: None,
            amount: Decimal::new(amount, 0),
            description: "test".to_string(),
            category: "Geral".to_string(),
            entry_date: date,
            invoice_id: None,
            status: "confirmed".to_string(),
            deleted_at: None,
            created_utc: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_no_moves_when_target_met() {
        let period = PeriodKey::new(2025, 10).unwrap();
        let candidates = vec![entry(100, date(2025, 9, 15))];
        let moves = plan_moves(
            Decimal::new(1000, 0),
            Decimal::new(1000, 0),
            &candidates,
            period,
        );
        assert!(moves.is_empty());

        let moves = plan_moves(
            Decimal::new(800, 0),
            Decimal::new(1000, 0),
            &candidates,
            period,
        );
        assert!(moves.is_empty());
    }

    #[test]
    fn test_oldest_first_then_largest() {
        let period = PeriodKey::new(2025, 10).unwrap();
        let small_old = entry(100, date(2025, 9, 1));
        let big_old = entry(500, date(2025, 9, 1));
        let big_newer = entry(900, date(2025, 9, 20));
        let candidates = vec![small_old.clone(), big_newer, big_old.clone()];

        let moves = plan_moves(
            Decimal::new(600, 0),
            Decimal::ZERO,
            &candidates,
            period,
        );

        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].id, big_old.entry_id);
        assert_eq!(moves[1].id, small_old.entry_id);
    }

    #[test]
    fn test_overshoot_accepted_not_split() {
        let period = PeriodKey::new(2025, 10).unwrap();
        let candidates = vec![entry(900, date(2025, 9, 5))];

        let moves = plan_moves(Decimal::new(100, 0), Decimal::ZERO, &candidates, period);

        // The record is larger than the shortfall but moves whole.
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].amount, Decimal::new(900, 0));
    }

    #[test]
    fn test_stops_once_shortfall_covered() {
        let period = PeriodKey::new(2025, 10).unwrap();
        let candidates = vec![
            entry(300, date(2025, 9, 1)),
            entry(300, date(2025, 9, 2)),
            entry(300, date(2025, 9, 3)),
        ];

        let moves = plan_moves(Decimal::new(500, 0), Decimal::ZERO, &candidates, period);
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_amounts_and_ids_preserved() {
        let period = PeriodKey::new(2025, 10).unwrap();
        let candidates = vec![
            entry(250, date(2025, 9, 10)),
            entry(750, date(2025, 11, 12)),
        ];

        let moves = plan_moves(Decimal::new(10_000, 0), Decimal::ZERO, &candidates, period);

        // Exhausts candidates; the (id, amount) multiset is unchanged and
        // only dates differ.
        assert_eq!(moves.len(), 2);
        for planned in &moves {
            let matching = candidates.iter().find(|c| c.entry_id == planned.id).unwrap();
            assert_eq!(planned.amount, matching.amount);
        }
        assert!(moves.iter().all(|m| period.contains(m.to_date)));
    }

    #[test]
    fn test_move_preserves_day_of_month_clamped() {
        let period = PeriodKey::new(2025, 2).unwrap();
        let candidates = vec![entry(100, date(2025, 1, 31))];

        let moves = plan_moves(Decimal::new(100, 0), Decimal::ZERO, &candidates, period);
        assert_eq!(moves[0].to_date, date(2025, 2, 28));
    }
}
