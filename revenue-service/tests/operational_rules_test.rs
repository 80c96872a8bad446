//! Scheduler naming, backfill idempotency markers, sync retry rules.

mod common;

use chrono::{TimeZone, Utc};
use revenue_service::models::PeriodKey;
use revenue_service::services::backfill::{already_backfilled, marker, BackfillMode};
use revenue_service::services::scheduler::{monthly_description, monthly_description_pattern};
use revenue_service::services::sync::{after_failure, FailureDisposition};
use service_core::retry::RetryPolicy;
use uuid::Uuid;

#[test]
fn test_monthly_description_matches_its_own_pattern() {
    // The idempotency guard searches by this SQL LIKE pattern; the
    // description generator must always produce a match for it.
    let period = PeriodKey::new(2025, 7).unwrap();
    let description = monthly_description(period, "Acme Corp");
    let pattern = monthly_description_pattern(period);

    let prefix = pattern.strip_suffix('%').unwrap();
    assert!(description.starts_with(prefix));
}

#[test]
fn test_backfill_markers_are_mode_disjoint() {
    let id = Uuid::new_v4();
    let a = marker(BackfillMode::Installments, id);
    let b = marker(BackfillMode::LegacyFinance, id);

    assert_ne!(a, b);
    assert!(a.contains(&id.to_string()));
    assert!(b.contains(&id.to_string()));
}

#[test]
fn test_second_backfill_run_creates_nothing() {
    // A rerun sees the markers the first run wrote into invoice notes and
    // skips every source it already covered.
    let first_run_sources = [Uuid::new_v4(), Uuid::new_v4()];
    let invoices: Vec<_> = first_run_sources
        .iter()
        .map(|id| {
            common::InvoiceBuilder::new(Uuid::new_v4(), 100)
                .notes(&format!(
                    "Backfilled from Parcela 1 [{}]",
                    marker(BackfillMode::Installments, *id)
                ))
                .build()
        })
        .collect();

    for id in &first_run_sources {
        assert!(already_backfilled(
            &invoices,
            BackfillMode::Installments,
            *id
        ));
    }
    // A source outside the first run still gets created.
    assert!(!already_backfilled(
        &invoices,
        BackfillMode::Installments,
        Uuid::new_v4()
    ));
}

#[test]
fn test_backfill_mode_parsing() {
    assert_eq!(
        "installments".parse::<BackfillMode>().unwrap(),
        BackfillMode::Installments
    );
    assert_eq!(
        "legacy-finance".parse::<BackfillMode>().unwrap(),
        BackfillMode::LegacyFinance
    );
    assert!("everything".parse::<BackfillMode>().is_err());
}

#[test]
fn test_sync_task_retries_then_fails_permanently() {
    let policy = RetryPolicy::sync_mirror();
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    match after_failure(1, &policy, now) {
        FailureDisposition::RetryAt(at) => assert!(at > now),
        FailureDisposition::PermanentlyFailed => panic!("First failure must retry"),
    }

    assert_eq!(
        after_failure(policy.max_attempts as i32, &policy, now),
        FailureDisposition::PermanentlyFailed
    );
}

#[test]
fn test_sync_retry_backoff_grows() {
    let policy = RetryPolicy::sync_mirror();
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let first = match after_failure(1, &policy, now) {
        FailureDisposition::RetryAt(at) => at,
        _ => panic!("expected retry"),
    };
    let third = match after_failure(3, &policy, now) {
        FailureDisposition::RetryAt(at) => at,
        _ => panic!("expected retry"),
    };
    assert!(third >= first);
}
