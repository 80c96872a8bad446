//! Application startup and lifecycle management.

use crate::config::RevenueConfig;
use crate::handlers;
use crate::middleware::job_auth_middleware;
use crate::services::{get_metrics, init_metrics, Database, ReportCache};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get,
    routing::post, Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RevenueConfig,
    pub db: Arc<Database>,
    pub cache: Arc<ReportCache>,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "revenue-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "revenue-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RevenueConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: RevenueConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: RevenueConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let cache = Arc::new(ReportCache::new(config.reporting.cache_ttl_secs));

        let state = AppState {
            config: config.clone(),
            db: Arc::new(db),
            cache,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Revenue service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let health_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .with_state(health_state);

        // Scheduler and operator triggers share the bearer-secret guard.
        let trigger_router = Router::new()
            .route("/jobs/monthly-run", post(handlers::jobs::monthly_run))
            .route("/jobs/overdue-sweep", post(handlers::jobs::overdue_sweep))
            .route("/jobs/sync-drain", post(handlers::jobs::sync_drain))
            .route("/admin/reconcile", post(handlers::admin::reconcile))
            .route("/admin/backfill", post(handlers::admin::backfill))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                job_auth_middleware,
            ));

        // Tenant-scoped API; org arrives via the X-Org-ID header.
        let api_router = Router::new()
            .route("/invoices/monthly", post(handlers::invoices::create_monthly))
            .route("/invoices/:id/pay", post(handlers::invoices::mark_paid))
            .route("/invoices/:id/cancel", post(handlers::invoices::cancel))
            .route(
                "/installments/:id/confirm",
                post(handlers::installments::confirm),
            )
            .route("/reports/projection", get(handlers::reports::projection))
            .route("/reports/summary", get(handlers::reports::monthly_summary));

        let router = Router::new()
            .merge(trigger_router)
            .merge(api_router)
            .with_state(self.state)
            .merge(health_router)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware));

        tracing::info!(port = self.port, "Revenue service started");
        axum::serve(self.listener, router).await
    }
}
