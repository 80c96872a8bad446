//! Invoice model and lifecycle state machine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice lifecycle status.
///
/// `draft → open → {paid, overdue} → void`; `overdue → paid` allowed;
/// `paid → void` allowed for administrative correction; `void` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "open" => InvoiceStatus::Open,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "void" => InvoiceStatus::Void,
            _ => InvoiceStatus::Draft,
        }
    }

    /// The lifecycle transition table. Anything not listed here fails with
    /// an invalid-transition conflict.
    pub fn can_transition(self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, to),
            (Draft, Open)
                | (Draft, Void)
                | (Open, Paid)
                | (Open, Overdue)
                | (Open, Void)
                | (Overdue, Paid)
                | (Overdue, Void)
                | (Paid, Void)
        )
    }

    /// Terminal for billing purposes: cannot return to an earlier state.
    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }
}

/// Billable document; aggregation root for its line items and payments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn parsed_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// `total == subtotal − discount + tax`.
    pub fn totals_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount + self.tax
    }

    /// Whether the notes field carries the given backfill marker.
    pub fn has_marker(&self, marker: &str) -> bool {
        self.notes
            .as_deref()
            .map(|n| n.contains(marker))
            .unwrap_or(false)
    }
}

/// Single invoice line.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceLineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_amount: Decimal,
    pub line_total: Decimal,
}

/// Input for creating an invoice with its line items.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub org_id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub items: Vec<CreateLineItem>,
}

impl CreateInvoice {
    pub fn total(&self) -> Decimal {
        self.subtotal - self.discount + self.tax
    }
}

/// Input for a single line item.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub description: String,
    pub quantity: i32,
    pub unit_amount: Decimal,
}

impl CreateLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_amount * Decimal::from(self.quantity)
    }
}
