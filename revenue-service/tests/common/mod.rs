//! Shared builders for domain-logic tests.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use revenue_service::models::{Invoice, InvoiceStatus, LedgerEntry, Payment, PaymentStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn money(units: i64) -> Decimal {
    Decimal::new(units, 0)
}

pub struct InvoiceBuilder {
    invoice: Invoice,
}

impl InvoiceBuilder {
    pub fn new(client_id: Uuid, total: i64) -> Self {
        let total = money(total);
        Self {
            invoice: Invoice {
                invoice_id: Uuid::new_v4(),
                org_id: Uuid::new_v4(),
                client_id,
                number: "2025-01-TEST".to_string(),
                status: InvoiceStatus::Open.as_str().to_string(),
                issue_date: date(2025, 1, 1),
                due_date: date(2025, 1, 10),
                subtotal: total,
                discount: Decimal::ZERO,
                tax: Decimal::ZERO,
                total,
                currency: "BRL".to_string(),
                notes: None,
                deleted_at: None,
                created_utc: Utc::now(),
            },
        }
    }

    pub fn status(mut self, status: InvoiceStatus) -> Self {
        self.invoice.status = status.as_str().to_string();
        self
    }

    pub fn issued(mut self, date: NaiveDate) -> Self {
        self.invoice.issue_date = date;
        self
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.invoice.due_date = date;
        self
    }

    pub fn notes(mut self, notes: &str) -> Self {
        self.invoice.notes = Some(notes.to_string());
        self
    }

    pub fn deleted(mut self) -> Self {
        self.invoice.deleted_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> Invoice {
        self.invoice
    }
}

pub fn income_entry(invoice_id: Option<Uuid>, amount: i64, entry_date: NaiveDate) -> LedgerEntry {
    ledger_entry("income", invoice_id, amount, entry_date)
}

pub fn expense_entry(amount: i64, entry_date: NaiveDate) -> LedgerEntry {
    ledger_entry("expense", None, amount, entry_date)
}

fn ledger_entry(
    entry_type: &str,
    invoice_id: Option<Uuid>,
    amount: i64,
    entry_date: NaiveDate,
) -> LedgerEntry {
    LedgerEntry {
        entry_id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        client_id: None,
        entry_type: entry_type.to_string(),
        subtype: None,
        amount: money(amount),
        description: "test entry".to_string(),
        category: "Mensalidade".to_string(),
        entry_date,
        invoice_id,
        status: "confirmed".to_string(),
        deleted_at: None,
        created_utc: Utc::now(),
    }
}

pub fn paid_payment(invoice_id: Option<Uuid>, amount: i64) -> Payment {
    Payment {
        payment_id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        invoice_id,
        amount: money(amount),
        method: "pix".to_string(),
        status: PaymentStatus::Paid.as_str().to_string(),
        provider: None,
        paid_at: Some(Utc::now()),
        created_utc: Utc::now(),
    }
}
