//! Reconciliation move planning.

mod common;

use common::{date, income_entry, money};
use revenue_service::models::PeriodKey;
use revenue_service::services::reconciliation::plan_moves;

#[test]
fn test_no_moves_when_target_already_met() {
    let period = PeriodKey::new(2025, 3).unwrap();
    let candidates = vec![income_entry(None, 500, date(2025, 2, 10))];

    let moves = plan_moves(money(1000), money(1200), &candidates, period);
    assert!(moves.is_empty());
}

#[test]
fn test_oldest_candidates_move_first() {
    let period = PeriodKey::new(2025, 3).unwrap();
    let old = income_entry(None, 400, date(2025, 2, 5));
    let newer = income_entry(None, 400, date(2025, 2, 20));
    // Input deliberately out of order.
    let candidates = vec![newer.clone(), old.clone()];

    let moves = plan_moves(money(400), money(0), &candidates, period);
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].id, old.entry_id);
}

#[test]
fn test_largest_amount_breaks_date_ties() {
    let period = PeriodKey::new(2025, 3).unwrap();
    let small = income_entry(None, 100, date(2025, 2, 5));
    let large = income_entry(None, 900, date(2025, 2, 5));
    let candidates = vec![small.clone(), large.clone()];

    let moves = plan_moves(money(500), money(0), &candidates, period);
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].id, large.entry_id);
}

#[test]
fn test_overshoot_is_accepted_whole() {
    // Amounts are immutable; a 700 record covering a 500 shortfall moves
    // entirely rather than being split.
    let period = PeriodKey::new(2025, 3).unwrap();
    let candidates = vec![income_entry(None, 700, date(2025, 2, 10))];

    let moves = plan_moves(money(500), money(0), &candidates, period);
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].amount, money(700));
}

#[test]
fn test_moved_date_keeps_day_of_month_clamped() {
    // An entry on Jan 31 moving into February lands on Feb 28.
    let period = PeriodKey::new(2025, 2).unwrap();
    let candidates = vec![income_entry(None, 300, date(2025, 1, 31))];

    let moves = plan_moves(money(300), money(0), &candidates, period);
    assert_eq!(moves[0].to_date, date(2025, 2, 28));
}

#[test]
fn test_moves_stop_once_shortfall_is_covered() {
    let period = PeriodKey::new(2025, 3).unwrap();
    let candidates = vec![
        income_entry(None, 600, date(2025, 2, 1)),
        income_entry(None, 600, date(2025, 2, 2)),
        income_entry(None, 600, date(2025, 2, 3)),
    ];

    let moves = plan_moves(money(1000), money(0), &candidates, period);
    assert_eq!(moves.len(), 2);
}
