//! HTTP handlers for revenue-service.

pub mod admin;
pub mod installments;
pub mod invoices;
pub mod jobs;
pub mod reports;
