//! Billing reconciliation and revenue recognition service.
//!
//! Owns the invoice lifecycle, the monthly installment scheduler, the
//! deduplicating revenue engine, reconciliation toward declared monthly
//! totals, revenue projection, and historical backfill.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
