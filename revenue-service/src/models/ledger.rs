//! General-ledger entry model: the canonical income/expense record.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Income or expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Income,
    Expense,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Income => "income",
            EntryType::Expense => "expense",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "expense" => EntryType::Expense,
            _ => EntryType::Income,
        }
    }
}

/// Ledger entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Confirmed => "confirmed",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending" => EntryStatus::Pending,
            "cancelled" => EntryStatus::Cancelled,
            _ => EntryStatus::Confirmed,
        }
    }
}

/// A general-ledger row. May cross-reference an invoice, which is what the
/// deduplication engine keys on.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub org_id: Uuid,
    pub client_id: Option<Uuid>,
    pub entry_type: String,
    pub subtype: Option<String>,
    pub amount: Decimal,
    pub description: String,
    pub category: String,
    pub entry_date: NaiveDate,
    pub invoice_id: Option<Uuid>,
    pub status: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn parsed_type(&self) -> EntryType {
        EntryType::from_string(&self.entry_type)
    }

    pub fn parsed_status(&self) -> EntryStatus {
        EntryStatus::from_string(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_confirmed(&self) -> bool {
        self.parsed_status() == EntryStatus::Confirmed
    }
}

/// Input for creating a ledger entry.
#[derive(Debug, Clone)]
pub struct CreateLedgerEntry {
    pub org_id: Uuid,
    pub client_id: Option<Uuid>,
    pub entry_type: EntryType,
    pub subtype: Option<String>,
    pub amount: Decimal,
    pub description: String,
    pub category: String,
    pub entry_date: NaiveDate,
    pub invoice_id: Option<Uuid>,
    pub status: EntryStatus,
}

/// Filter for repository reads; every field narrows the query.
#[derive(Debug, Clone, Default)]
pub struct LedgerEntryFilter {
    pub entry_type: Option<EntryType>,
    pub status: Option<EntryStatus>,
    pub client_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub description_like: Option<String>,
}
