//! Configuration module for revenue-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct RevenueConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Shared-secret bearer credential for the scheduled and admin triggers.
    pub trigger_token: String,
}

#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub cache_ttl_secs: i64,
    pub top_n: usize,
}

impl RevenueConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let log_level = common.log_level.clone();

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "revenue-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            jobs: JobsConfig {
                trigger_token: env::var("JOB_TRIGGER_TOKEN").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("JOB_TRIGGER_TOKEN is required"))
                })?,
            },
            reporting: ReportingConfig {
                cache_ttl_secs: env::var("REPORT_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
                top_n: env::var("REPORT_TOP_N")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
        })
    }
}
