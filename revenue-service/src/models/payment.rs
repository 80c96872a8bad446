//! Payment (settlement) model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

/// A settlement event, optionally linked to an invoice. Immutable once
/// paid except for administrative correction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub org_id: Uuid,
    pub client_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub provider: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    pub fn parsed_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }

    pub fn is_paid(&self) -> bool {
        self.parsed_status() == PaymentStatus::Paid
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub org_id: Uuid,
    pub client_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: String,
    pub status: PaymentStatus,
    pub provider: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}
