//! Client billing configuration, read-only input to the scheduler.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing configuration carried by a client. The engine never mutates
/// clients; it only reads contract terms from them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingClient {
    pub client_id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub contract_value: Decimal,
    pub payment_day: i32,
    pub is_installment: bool,
    pub installment_count: Option<i32>,
    pub installment_value: Option<Decimal>,
    pub installment_payment_days: Option<Vec<i32>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl BillingClient {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}
