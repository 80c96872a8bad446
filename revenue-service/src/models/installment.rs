//! Installment model: one scheduled portion of a parceled contract.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Installment status. Monotonic: once confirmed, never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Late,
    Confirmed,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "pending",
            InstallmentStatus::Late => "late",
            InstallmentStatus::Confirmed => "confirmed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "late" => InstallmentStatus::Late,
            "confirmed" => InstallmentStatus::Confirmed,
            _ => InstallmentStatus::Pending,
        }
    }
}

/// One scheduled portion of a client's parceled contract.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Installment {
    pub installment_id: Uuid,
    pub org_id: Uuid,
    pub client_id: Uuid,
    pub number: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Installment {
    pub fn parsed_status(&self) -> InstallmentStatus {
        InstallmentStatus::from_string(&self.status)
    }

    pub fn is_confirmed(&self) -> bool {
        self.parsed_status() == InstallmentStatus::Confirmed
    }

    /// Pending past its due date: flips to late during the monthly sweep.
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.parsed_status() == InstallmentStatus::Pending && self.due_date < today
    }
}
