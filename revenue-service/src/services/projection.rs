//! Revenue projection and client reporting.
//!
//! Buckets invoices into confirmed / projected / at-risk revenue per
//! month, aggregates per client, and ranks clients. Aggregation is pure;
//! the service wraps it with repository reads and the typed report cache.

use crate::models::{DateRange, Invoice, InvoiceStatus, PeriodKey};
use crate::services::cache::{ReportCache, ReportKind};
use crate::services::Database;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Revenue for one month, split by confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub month: PeriodKey,
    /// Paid invoices.
    pub confirmed: Decimal,
    /// Open invoices due inside the analysis window.
    pub projected: Decimal,
    /// Overdue invoices.
    pub at_risk: Decimal,
    pub invoice_count: u32,
}

/// Aggregates for one client over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRevenue {
    pub client_id: Uuid,
    pub revenue: Decimal,
    pub invoice_count: u32,
    pub average_invoice: Decimal,
}

/// Full projection report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub window: DateRange,
    pub months: Vec<MonthlyRevenue>,
    pub clients: Vec<ClientRevenue>,
    pub top_by_revenue: Vec<ClientRevenue>,
    pub top_by_count: Vec<ClientRevenue>,
    /// Months with data over months in window, in [0, 1]. A confidence
    /// signal only, not a statistical estimator.
    pub projection_accuracy: f64,
}

/// Bucket an invoice. Paid invoices count under their issue month;
/// open and overdue ones under their due month. Draft and void invoices
/// carry no revenue signal.
fn bucket_month(invoice: &Invoice, window: DateRange) -> Option<(PeriodKey, InvoiceStatus)> {
    match invoice.parsed_status() {
        InvoiceStatus::Paid => Some((PeriodKey::from_date(invoice.issue_date), InvoiceStatus::Paid)),
        InvoiceStatus::Open => {
            if window.contains(invoice.due_date) {
                Some((PeriodKey::from_date(invoice.due_date), InvoiceStatus::Open))
            } else {
                None
            }
        }
        InvoiceStatus::Overdue => Some((
            PeriodKey::from_date(invoice.due_date),
            InvoiceStatus::Overdue,
        )),
        InvoiceStatus::Draft | InvoiceStatus::Void => None,
    }
}

/// Build the projection report over already-fetched invoices. Pure and
/// deterministic for the same inputs.
pub fn build_projection(invoices: &[Invoice], window: DateRange, top_n: usize) -> ProjectionReport {
    let window_months = window.months();
    let mut months: BTreeMap<PeriodKey, MonthlyRevenue> = window_months
        .iter()
        .map(|&month| {
            (
                month,
                MonthlyRevenue {
                    month,
                    confirmed: Decimal::ZERO,
                    projected: Decimal::ZERO,
                    at_risk: Decimal::ZERO,
                    invoice_count: 0,
                },
            )
        })
        .collect();

    let mut clients: BTreeMap<Uuid, ClientRevenue> = BTreeMap::new();

    for invoice in invoices {
        if !invoice.is_active() {
            continue;
        }
        let Some((month, status)) = bucket_month(invoice, window) else {
            continue;
        };
        let Some(bucket) = months.get_mut(&month) else {
            // Bucketed outside the window (e.g. paid early for a later month).
            continue;
        };

        bucket.invoice_count += 1;
        match status {
            InvoiceStatus::Paid => bucket.confirmed += invoice.total,
            InvoiceStatus::Open => bucket.projected += invoice.total,
            InvoiceStatus::Overdue => bucket.at_risk += invoice.total,
            _ => {}
        }

        let client = clients.entry(invoice.client_id).or_insert(ClientRevenue {
            client_id: invoice.client_id,
            revenue: Decimal::ZERO,
            invoice_count: 0,
            average_invoice: Decimal::ZERO,
        });
        client.revenue += invoice.total;
        client.invoice_count += 1;
    }

    for client in clients.values_mut() {
        if client.invoice_count > 0 {
            client.average_invoice = client.revenue / Decimal::from(client.invoice_count);
        }
    }

    let months: Vec<MonthlyRevenue> = months.into_values().collect();
    let months_with_data = months.iter().filter(|m| m.invoice_count > 0).count();
    let projection_accuracy = if window_months.is_empty() {
        0.0
    } else {
        (months_with_data as f64 / window_months.len() as f64).clamp(0.0, 1.0)
    };

    let clients: Vec<ClientRevenue> = clients.into_values().collect();

    let mut top_by_revenue = clients.clone();
    top_by_revenue.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    top_by_revenue.truncate(top_n);

    let mut top_by_count = clients.clone();
    top_by_count.sort_by(|a, b| b.invoice_count.cmp(&a.invoice_count));
    top_by_count.truncate(top_n);

    ProjectionReport {
        window,
        months,
        clients,
        top_by_revenue,
        top_by_count,
        projection_accuracy,
    }
}

pub struct ProjectionService {
    db: Arc<Database>,
    cache: Arc<ReportCache>,
    top_n: usize,
}

impl ProjectionService {
    pub fn new(db: Arc<Database>, cache: Arc<ReportCache>, top_n: usize) -> Self {
        Self { db, cache, top_n }
    }

    /// Projection for a date window, served from the report cache when a
    /// fresh copy exists.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn projection(
        &self,
        org_id: Uuid,
        window: DateRange,
    ) -> Result<ProjectionReport, AppError> {
        let variant = format!("{}..{}", window.from, window.to);

        if let Some(cached) = self.cache.get(org_id, ReportKind::Projection, &variant) {
            if let Ok(report) = serde_json::from_value::<ProjectionReport>(cached) {
                return Ok(report);
            }
        }

        let invoices = self
            .db
            .find_invoices_in_range(org_id, window.from, window.to)
            .await?;
        let report = build_projection(&invoices, window, self.top_n);

        if let Ok(value) = serde_json::to_value(&report) {
            self.cache
                .put(org_id, ReportKind::Projection, &variant, value);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(client: Uuid, status: &str, issue: NaiveDate, due: NaiveDate, total: i64) -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            client_id: client,
            number: format!("n-{}", Uuid::new_v4().simple()),
            status: status.to_string(),
            issue_date: issue,
            due_date: due,
            subtotal: Decimal::new(total, 0),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::new(total, 0),
            currency: "BRL".to_string(),
            notes: None,
            deleted_at: None,
            created_utc: Utc::now(),
        }
    }

    fn window() -> DateRange {
        DateRange::new(date(2025, 10, 1), date(2025, 12, 31))
    }

    #[test]
    fn test_buckets_by_status() {
        let client = Uuid::new_v4();
        let invoices = vec![
            invoice(client, "paid", date(2025, 10, 1), date(2025, 10, 5), 1000),
            invoice(client, "open", date(2025, 11, 1), date(2025, 11, 5), 800),
            invoice(client, "overdue", date(2025, 10, 1), date(2025, 10, 5), 300),
            invoice(client, "void", date(2025, 10, 1), date(2025, 10, 5), 999),
        ];

        let report = build_projection(&invoices, window(), 5);

        assert_eq!(report.months.len(), 3);
        let october = &report.months[0];
        assert_eq!(october.confirmed, Decimal::new(1000, 0));
        assert_eq!(october.at_risk, Decimal::new(300, 0));
        let november = &report.months[1];
        assert_eq!(november.projected, Decimal::new(800, 0));

        // Void carries nothing.
        let client_report = &report.clients[0];
        assert_eq!(client_report.revenue, Decimal::new(2100, 0));
        assert_eq!(client_report.invoice_count, 3);
        assert_eq!(client_report.average_invoice, Decimal::new(700, 0));
    }

    #[test]
    fn test_open_invoice_outside_window_ignored() {
        let client = Uuid::new_v4();
        let invoices = vec![invoice(
            client,
            "open",
            date(2025, 11, 1),
            date(2026, 3, 5),
            800,
        )];

        let report = build_projection(&invoices, window(), 5);
        assert!(report.months.iter().all(|m| m.projected == Decimal::ZERO));
        assert!(report.clients.is_empty());
    }

    #[test]
    fn test_rankings_and_top_n() {
        let big = Uuid::new_v4();
        let busy = Uuid::new_v4();
        let small = Uuid::new_v4();
        let invoices = vec![
            invoice(big, "paid", date(2025, 10, 1), date(2025, 10, 5), 5000),
            invoice(busy, "paid", date(2025, 10, 2), date(2025, 10, 6), 100),
            invoice(busy, "paid", date(2025, 11, 2), date(2025, 11, 6), 100),
            invoice(busy, "paid", date(2025, 12, 2), date(2025, 12, 6), 100),
            invoice(small, "paid", date(2025, 10, 3), date(2025, 10, 7), 50),
        ];

        let report = build_projection(&invoices, window(), 2);

        assert_eq!(report.top_by_revenue.len(), 2);
        assert_eq!(report.top_by_revenue[0].client_id, big);
        assert_eq!(report.top_by_count[0].client_id, busy);
        assert_eq!(report.top_by_count[0].invoice_count, 3);
    }

    #[test]
    fn test_projection_accuracy_bounds() {
        let client = Uuid::new_v4();
        let one_month = vec![invoice(
            client,
            "paid",
            date(2025, 10, 1),
            date(2025, 10, 5),
            100,
        )];

        let report = build_projection(&one_month, window(), 5);
        assert!((report.projection_accuracy - 1.0 / 3.0).abs() < f64::EPSILON);

        let empty = build_projection(&[], window(), 5);
        assert_eq!(empty.projection_accuracy, 0.0);

        let full = vec![
            invoice(client, "paid", date(2025, 10, 1), date(2025, 10, 5), 100),
            invoice(client, "paid", date(2025, 11, 1), date(2025, 11, 5), 100),
            invoice(client, "paid", date(2025, 12, 1), date(2025, 12, 5), 100),
        ];
        let report = build_projection(&full, window(), 5);
        assert_eq!(report.projection_accuracy, 1.0);
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let client = Uuid::new_v4();
        let invoices = vec![
            invoice(client, "paid", date(2025, 10, 1), date(2025, 10, 5), 100),
            invoice(client, "open", date(2025, 11, 1), date(2025, 11, 5), 200),
        ];
        assert_eq!(
            build_projection(&invoices, window(), 5),
            build_projection(&invoices, window(), 5)
        );
    }
}
