//! Typed report cache owned by the reporting layer.
//!
//! Keys are `(org_id, ReportKind)`; invalidation is typed as well, keyed
//! by `(org_id, EntityKind)` so a write to one entity kind evicts exactly
//! the reports derived from it.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// Entity kinds whose writes can invalidate cached reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Invoice,
    Payment,
    LedgerEntry,
    Installment,
}

/// Report kinds the cache can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Projection,
    ClientRanking,
    MonthlySummary,
}

impl ReportKind {
    /// Entity kinds a report of this kind is derived from.
    fn derived_from(self) -> &'static [EntityKind] {
        match self {
            ReportKind::Projection => &[EntityKind::Invoice, EntityKind::Payment],
            ReportKind::ClientRanking => &[EntityKind::Invoice],
            ReportKind::MonthlySummary => &[EntityKind::LedgerEntry, EntityKind::Payment],
        }
    }
}

struct CachedReport {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// TTL cache for aggregated reports. Injected into the reporting service;
/// nothing else holds a reference to it.
pub struct ReportCache {
    entries: DashMap<(Uuid, ReportKind, String), CachedReport>,
    ttl: Duration,
}

impl ReportCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// The extra `variant` component distinguishes parameterizations of
    /// the same report kind (e.g. different date windows).
    pub fn get(&self, org_id: Uuid, kind: ReportKind, variant: &str) -> Option<Value> {
        let key = (org_id, kind, variant.to_string());
        // The read guard from `get` must not be held across the eviction
        // below: removing under it blocks on the same shard.
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > Utc::now() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        // Re-checks expiry so a concurrent refresh is not evicted.
        self.entries.remove_if(&key, |_, e| e.expires_at <= Utc::now());
        None
    }

    pub fn put(&self, org_id: Uuid, kind: ReportKind, variant: &str, value: Value) {
        self.entries.insert(
            (org_id, kind, variant.to_string()),
            CachedReport {
                value,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }

    /// Evict every report for this org derived from the given entity kind.
    pub fn invalidate(&self, org_id: Uuid, entity: EntityKind) {
        self.entries.retain(|(key_org, report_kind, _), _| {
            !(*key_org == org_id && report_kind.derived_from().contains(&entity))
        });
    }

    /// Evict everything for an org.
    pub fn invalidate_org(&self, org_id: Uuid) {
        self.entries.retain(|(key_org, _, _), _| *key_org != org_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
