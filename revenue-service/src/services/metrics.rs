//! Prometheus metrics for revenue-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "revenue_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Invoice lifecycle transitions by target status.
pub static INVOICE_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "revenue_invoice_transitions_total",
        "Invoice lifecycle transitions by target status",
        &["status"]
    )
    .expect("Failed to register invoice_transitions_total")
});

/// Ledger entries created, by type and category.
pub static LEDGER_ENTRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "revenue_ledger_entries_total",
        "Ledger entries created by type and category",
        &["entry_type", "category"]
    )
    .expect("Failed to register ledger_entries_total")
});

/// Monthly scheduler run outcomes.
pub static SCHEDULER_CLIENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "revenue_scheduler_clients_total",
        "Clients processed by the monthly scheduler, by outcome",
        &["outcome"] // processed, created, error
    )
    .expect("Failed to register scheduler_clients_total")
});

/// Reconciliation moves applied.
pub static RECONCILE_MOVES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "revenue_reconcile_moves_total",
        "Ledger entries date-shifted by the reconciliation service",
        &["entry_type"]
    )
    .expect("Failed to register reconcile_moves_total")
});

/// Backfill records created.
pub static BACKFILL_CREATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "revenue_backfill_created_total",
        "Synthetic records created by the backfill service",
        &["record_kind"] // invoice, payment
    )
    .expect("Failed to register backfill_created_total")
});

/// Sync queue outcomes.
pub static SYNC_TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "revenue_sync_tasks_total",
        "Sync queue task outcomes",
        &["outcome"] // applied, retried, failed
    )
    .expect("Failed to register sync_tasks_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Force registration of all metrics at startup.
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICE_TRANSITIONS_TOTAL);
    Lazy::force(&LEDGER_ENTRIES_TOTAL);
    Lazy::force(&SCHEDULER_CLIENTS_TOTAL);
    Lazy::force(&RECONCILE_MOVES_TOTAL);
    Lazy::force(&BACKFILL_CREATED_TOTAL);
    Lazy::force(&SYNC_TASKS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Render the registry in the Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
