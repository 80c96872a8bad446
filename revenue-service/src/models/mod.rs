//! Domain models for revenue-service.

mod client;
mod installment;
mod invoice;
mod ledger;
mod payment;
mod period;
mod sync_task;

pub use client::BillingClient;
pub use installment::{Installment, InstallmentStatus};
pub use invoice::{
    CreateInvoice, CreateLineItem, Invoice, InvoiceLineItem, InvoiceStatus,
};
pub use ledger::{CreateLedgerEntry, EntryStatus, EntryType, LedgerEntry, LedgerEntryFilter};
pub use payment::{CreatePayment, Payment, PaymentStatus};
pub use period::{DateRange, PeriodKey};
pub use sync_task::{SyncTask, SyncTaskStatus};
