//! Read-side reporting endpoints.

use crate::middleware::OrgContext;
use crate::models::{DateRange, PeriodKey};
use crate::services::{ProjectionReport, ProjectionService, RevenueSummary, RevenueSummaryService};
use crate::startup::AppState;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use service_core::error::AppError;

const MAX_WINDOW_MONTHS: u32 = 24;

#[derive(Debug, Deserialize)]
pub struct ProjectionQuery {
    /// Number of months starting from the current one. Ignored when an
    /// explicit window is given.
    pub months: Option<u32>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// GET /reports/projection
pub async fn projection(
    State(state): State<AppState>,
    org: OrgContext,
    Query(query): Query<ProjectionQuery>,
) -> Result<Json<ProjectionReport>, AppError> {
    let window = resolve_window(&query, Utc::now().date_naive())?;

    let service = ProjectionService::new(
        state.db.clone(),
        state.cache.clone(),
        state.config.reporting.top_n,
    );
    let report = service.projection(org.org_id, window).await?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// GET /reports/summary
///
/// Deduplicated income, expenses, and net for one month; defaults to the
/// current one.
pub async fn monthly_summary(
    State(state): State<AppState>,
    org: OrgContext,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<RevenueSummary>, AppError> {
    let current = PeriodKey::from_date(Utc::now().date_naive());
    let period = match (query.year, query.month) {
        (Some(year), Some(month)) => PeriodKey::new(year, month).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Invalid period {}-{:02}", year, month))
        })?,
        (None, None) => current,
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "year and month must be given together"
            )))
        }
    };

    let service = RevenueSummaryService::new(state.db.clone(), state.cache.clone());
    let summary = service.monthly_summary(org.org_id, period).await?;

    Ok(Json(summary))
}

fn resolve_window(query: &ProjectionQuery, today: NaiveDate) -> Result<DateRange, AppError> {
    let window = match (query.from_date, query.to_date) {
        (Some(from), Some(to)) => {
            if from > to {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "from_date must not be after to_date"
                )));
            }
            DateRange::new(from, to)
        }
        (None, None) => {
            let months = query.months.unwrap_or(3).max(1);
            let start = PeriodKey::from_date(today);
            let mut end = start;
            for _ in 1..months {
                end = end.next();
            }
            DateRange::new(start.first_day(), end.last_day())
        }
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "from_date and to_date must be given together"
            )))
        }
    };

    if window.months().len() > MAX_WINDOW_MONTHS as usize {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Projection window is limited to {MAX_WINDOW_MONTHS} months"
        )));
    }

    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_window_is_three_months() {
        let query = ProjectionQuery {
            months: None,
            from_date: None,
            to_date: None,
        };
        let window = resolve_window(&query, date(2025, 1, 15)).unwrap();
        assert_eq!(window.from, date(2025, 1, 1));
        assert_eq!(window.to, date(2025, 3, 31));
    }

    #[test]
    fn explicit_window_wins_over_months() {
        let query = ProjectionQuery {
            months: Some(6),
            from_date: Some(date(2025, 2, 1)),
            to_date: Some(date(2025, 2, 28)),
        };
        let window = resolve_window(&query, date(2025, 1, 15)).unwrap();
        assert_eq!(window.from, date(2025, 2, 1));
        assert_eq!(window.to, date(2025, 2, 28));
    }

    #[test]
    fn half_open_window_is_rejected() {
        let query = ProjectionQuery {
            months: None,
            from_date: Some(date(2025, 2, 1)),
            to_date: None,
        };
        assert!(resolve_window(&query, date(2025, 1, 15)).is_err());
    }

    #[test]
    fn oversized_window_is_rejected() {
        let query = ProjectionQuery {
            months: Some(36),
            from_date: None,
            to_date: None,
        };
        assert!(resolve_window(&query, date(2025, 1, 15)).is_err());
    }
}
