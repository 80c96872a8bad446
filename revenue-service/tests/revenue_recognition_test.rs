//! Revenue recognition over realistic ledger/payment mixes.

mod common;

use common::{date, expense_entry, income_entry, money, paid_payment};
use revenue_service::services::dedup::{expense_total, recognize_income, RevenueRecord};
use uuid::Uuid;

#[test]
fn test_month_with_parceled_and_direct_revenue() {
    // One client pays a 1200 contract in two 600 installments recorded as
    // payments against INV-1, which also has its 1200 ledger row. Another
    // 1200 arrives as a ledger-only entry. Recognized revenue is 2400.
    let inv1 = Uuid::new_v4();
    let jan = date(2025, 1, 15);

    let entries = vec![
        income_entry(None, 1200, jan),
        income_entry(Some(inv1), 1200, jan),
    ];
    let payments = vec![paid_payment(Some(inv1), 600), paid_payment(Some(inv1), 600)];

    let records: Vec<RevenueRecord> = entries
        .iter()
        .filter_map(RevenueRecord::from_entry)
        .chain(payments.iter().map(RevenueRecord::from_payment))
        .collect();

    let result = recognize_income(&records);
    assert_eq!(result.income, money(2400));
    assert_eq!(result.skipped_payments.len(), 2);
}

#[test]
fn test_expense_entries_never_become_revenue_records() {
    let jan = date(2025, 1, 10);
    let entries = vec![income_entry(None, 500, jan), expense_entry(300, jan)];

    let records: Vec<RevenueRecord> = entries
        .iter()
        .filter_map(RevenueRecord::from_entry)
        .collect();

    assert_eq!(records.len(), 1);
    assert_eq!(recognize_income(&records).income, money(500));
}

#[test]
fn test_expense_total_ignores_income_rows() {
    let jan = date(2025, 1, 10);
    let entries = vec![
        expense_entry(300, jan),
        expense_entry(150, jan),
        income_entry(None, 999, jan),
    ];

    assert_eq!(expense_total(&entries), money(450));
}

#[test]
fn test_unlinked_payment_counts_alongside_linked_ledger() {
    // A payment without any invoice reference is its own economic event
    // even when linked ledger rows exist in the same period.
    let inv = Uuid::new_v4();
    let records = vec![
        RevenueRecord::from_entry(&income_entry(Some(inv), 800, date(2025, 2, 1))).unwrap(),
        RevenueRecord::from_payment(&paid_payment(None, 90)),
        RevenueRecord::from_payment(&paid_payment(Some(inv), 800)),
    ];

    let result = recognize_income(&records);
    assert_eq!(result.income, money(890));
    assert_eq!(result.skipped_payments.len(), 1);
}
