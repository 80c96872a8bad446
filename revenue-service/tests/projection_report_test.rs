//! Projection report aggregation.

mod common;

use common::{date, money, InvoiceBuilder};
use revenue_service::models::{DateRange, InvoiceStatus, PeriodKey};
use revenue_service::services::projection::build_projection;
use uuid::Uuid;

fn q1_window() -> DateRange {
    DateRange::new(date(2025, 1, 1), date(2025, 3, 31))
}

#[test]
fn test_buckets_by_status() {
    let client = Uuid::new_v4();
    let invoices = vec![
        InvoiceBuilder::new(client, 1000)
            .status(InvoiceStatus::Paid)
            .issued(date(2025, 1, 5))
            .build(),
        InvoiceBuilder::new(client, 800)
            .status(InvoiceStatus::Open)
            .due(date(2025, 2, 10))
            .build(),
        InvoiceBuilder::new(client, 600)
            .status(InvoiceStatus::Overdue)
            .due(date(2025, 3, 10))
            .build(),
    ];

    let report = build_projection(&invoices, q1_window(), 5);
    assert_eq!(report.months.len(), 3);

    let jan = &report.months[0];
    assert_eq!(jan.month, PeriodKey::new(2025, 1).unwrap());
    assert_eq!(jan.confirmed, money(1000));

    let feb = &report.months[1];
    assert_eq!(feb.projected, money(800));

    let mar = &report.months[2];
    assert_eq!(mar.at_risk, money(600));

    assert!((report.projection_accuracy - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_draft_void_and_deleted_carry_no_signal() {
    let client = Uuid::new_v4();
    let invoices = vec![
        InvoiceBuilder::new(client, 500)
            .status(InvoiceStatus::Draft)
            .build(),
        InvoiceBuilder::new(client, 500)
            .status(InvoiceStatus::Void)
            .build(),
        InvoiceBuilder::new(client, 500)
            .status(InvoiceStatus::Paid)
            .deleted()
            .build(),
    ];

    let report = build_projection(&invoices, q1_window(), 5);
    assert!(report.months.iter().all(|m| m.invoice_count == 0));
    assert!(report.clients.is_empty());
    assert_eq!(report.projection_accuracy, 0.0);
}

#[test]
fn test_open_invoice_due_outside_window_is_excluded() {
    let client = Uuid::new_v4();
    let invoices = vec![InvoiceBuilder::new(client, 900)
        .status(InvoiceStatus::Open)
        .due(date(2025, 6, 10))
        .build()];

    let report = build_projection(&invoices, q1_window(), 5);
    assert!(report.months.iter().all(|m| m.invoice_count == 0));
}

#[test]
fn test_client_ranking_and_averages() {
    let big = Uuid::new_v4();
    let busy = Uuid::new_v4();

    let mut invoices = vec![InvoiceBuilder::new(big, 5000)
        .status(InvoiceStatus::Paid)
        .issued(date(2025, 1, 5))
        .build()];
    for day in 1..=3 {
        invoices.push(
            InvoiceBuilder::new(busy, 300)
                .status(InvoiceStatus::Paid)
                .issued(date(2025, 2, day))
                .build(),
        );
    }

    let report = build_projection(&invoices, q1_window(), 1);
    assert_eq!(report.top_by_revenue.len(), 1);
    assert_eq!(report.top_by_revenue[0].client_id, big);
    assert_eq!(report.top_by_count[0].client_id, busy);

    let busy_stats = report
        .clients
        .iter()
        .find(|c| c.client_id == busy)
        .unwrap();
    assert_eq!(busy_stats.average_invoice, money(300));
    assert_eq!(busy_stats.invoice_count, 3);
}
