//! Services module for revenue-service.

pub mod backfill;
pub mod cache;
pub mod database;
pub mod dedup;
pub mod lifecycle;
pub mod metrics;
pub mod projection;
pub mod reconciliation;
pub mod scheduler;
pub mod sync;

pub use backfill::{already_backfilled, BackfillMode, BackfillReport, BackfillService};
pub use cache::{EntityKind, ReportCache, ReportKind};
pub use database::Database;
pub use dedup::{
    recognize_income, RecognizedRevenue, RevenueRecord, RevenueSummary, RevenueSummaryService,
};
pub use lifecycle::InvoiceLifecycle;
pub use metrics::{get_metrics, init_metrics};
pub use projection::{build_projection, ProjectionReport, ProjectionService};
pub use reconciliation::{ReconcileReport, ReconciliationService};
pub use scheduler::{ConfirmSource, InstallmentScheduler, RunSummary};
pub use sync::{ReportCacheSink, SyncQueue, SyncSink};
