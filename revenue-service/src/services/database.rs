//! Database service for revenue-service: the Ledger Store.
//!
//! Every read and write is scoped by org id; soft-deleted rows are
//! filtered at this boundary so they can never leak into aggregation.

use crate::models::{
    BillingClient, CreateInvoice, CreateLedgerEntry, CreatePayment, EntryType, Installment,
    InstallmentStatus, Invoice, InvoiceLineItem, InvoiceStatus, LedgerEntry, LedgerEntryFilter,
    Payment, SyncTask, SyncTaskStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, org_id, client_id, number, status, issue_date, \
     due_date, subtotal, discount, tax, total, currency, notes, deleted_at, created_utc";

const ENTRY_COLUMNS: &str = "entry_id, org_id, client_id, entry_type, subtype, amount, \
     description, category, entry_date, invoice_id, status, deleted_at, created_utc";

const PAYMENT_COLUMNS: &str = "payment_id, org_id, client_id, invoice_id, amount, method, \
     status, provider, paid_at, created_utc";

const INSTALLMENT_COLUMNS: &str = "installment_id, org_id, client_id, number, amount, \
     due_date, status, paid_at, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "revenue-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations (read-only: the engine never mutates clients)
    // -------------------------------------------------------------------------

    /// List active clients carrying billing configuration.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_billing_clients(&self, org_id: Uuid) -> Result<Vec<BillingClient>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_billing_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, BillingClient>(
            r#"
            SELECT client_id, org_id, name, contract_value, payment_day, is_installment,
                   installment_count, installment_value, installment_payment_days,
                   deleted_at, created_utc
            FROM clients
            WHERE org_id = $1 AND deleted_at IS NULL
            ORDER BY name
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    /// Get one active client.
    #[instrument(skip(self), fields(org_id = %org_id, client_id = %client_id))]
    pub async fn find_client(
        &self,
        org_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<BillingClient>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_client"])
            .start_timer();

        let client = sqlx::query_as::<_, BillingClient>(
            r#"
            SELECT client_id, org_id, name, contract_value, payment_day, is_installment,
                   installment_count, installment_value, installment_payment_days,
                   deleted_at, created_utc
            FROM clients
            WHERE org_id = $1 AND client_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(org_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create an invoice together with its line items in one transaction.
    #[instrument(skip(self, input), fields(org_id = %input.org_id, client_id = %input.client_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, org_id, client_id, number, status, issue_date,
                                  due_date, subtotal, discount, tax, total, currency, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(input.org_id)
        .bind(input.client_id)
        .bind(&input.number)
        .bind(input.status.as_str())
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(input.subtotal)
        .bind(input.discount)
        .bind(input.tax)
        .bind(input.total())
        .bind(&input.currency)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice number '{}' already exists for this org",
                    input.number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        for item in &input.items {
            sqlx::query(
                r#"
                INSERT INTO invoice_line_items (line_item_id, invoice_id, description,
                                                quantity, unit_amount, line_total)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_amount)
            .bind(item.line_total())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create line item: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();

        debug_assert!(invoice.totals_consistent());
        info!(invoice_id = %invoice.invoice_id, number = %invoice.number, "Invoice created");

        Ok(invoice)
    }

    /// Get one active invoice.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn find_invoice(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1 AND invoice_id = $2 AND deleted_at IS NULL
            "#
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Find a client's non-void invoice whose due date falls in the range.
    /// This is the duplicate-period check for monthly invoice creation.
    #[instrument(skip(self), fields(org_id = %org_id, client_id = %client_id))]
    pub async fn find_invoice_by_due_range(
        &self,
        org_id: Uuid,
        client_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice_by_due_range"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1 AND client_id = $2
              AND due_date >= $3 AND due_date <= $4
              AND status <> 'void'
              AND deleted_at IS NULL
            LIMIT 1
            "#
        ))
        .bind(org_id)
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to search invoices: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Active invoices whose issue or due date touches the range, for
    /// projection and reporting.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_invoices_in_range(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoices_in_range"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1
              AND deleted_at IS NULL
              AND ((issue_date >= $2 AND issue_date <= $3)
                OR (due_date >= $2 AND due_date <= $3))
            ORDER BY due_date, invoice_id
            "#
        ))
        .bind(org_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Compare-and-set status update. Returns false when the invoice was
    /// not in the expected state (lost race or invalid caller assumption).
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn update_invoice_status(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice_status"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1
            WHERE org_id = $2 AND invoice_id = $3 AND status = $4 AND deleted_at IS NULL
            "#,
        )
        .bind(to.as_str())
        .bind(org_id)
        .bind(invoice_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice status: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() == 1)
    }

    /// Nightly sweep: every open invoice past its due date becomes overdue.
    /// Idempotent by construction.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn sweep_overdue(&self, org_id: Uuid, today: NaiveDate) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sweep_overdue"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'overdue'
            WHERE org_id = $1 AND status = 'open' AND due_date < $2 AND deleted_at IS NULL
            "#,
        )
        .bind(org_id)
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Overdue sweep failed: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    /// Active invoices carrying notes text. Backfill scans these for its
    /// idempotency markers.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_invoices_with_notes(&self, org_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoices_with_notes"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE org_id = $1 AND notes IS NOT NULL AND deleted_at IS NULL
            "#
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list noted invoices: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Line items for one invoice.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn find_line_items(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_line_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            SELECT line_item_id, invoice_id, description, quantity, unit_amount, line_total
            FROM invoice_line_items
            WHERE invoice_id = $1
            ORDER BY line_item_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list line items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    /// Record a payment.
    #[instrument(skip(self, input), fields(org_id = %input.org_id))]
    pub async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (payment_id, org_id, client_id, invoice_id, amount,
                                  method, status, provider, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.org_id)
        .bind(input.client_id)
        .bind(input.invoice_id)
        .bind(input.amount)
        .bind(&input.method)
        .bind(input.status.as_str())
        .bind(&input.provider)
        .bind(input.paid_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();

        info!(payment_id = %payment.payment_id, "Payment recorded");

        Ok(payment)
    }

    /// Payments tied to one invoice.
    #[instrument(skip(self), fields(org_id = %org_id, invoice_id = %invoice_id))]
    pub async fn find_payments_for_invoice(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_payments_for_invoice"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE org_id = $1 AND invoice_id = $2
            ORDER BY created_utc
            "#
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Paid payments settled inside the date window, for deduplicated
    /// revenue recognition.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_paid_payments_in_range(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_paid_payments_in_range"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE org_id = $1 AND status = 'paid'
              AND paid_at >= $2 AND paid_at < $3
            ORDER BY paid_at, payment_id
            "#
        ))
        .bind(org_id)
        .bind(day_start(from))
        .bind(day_start(to + chrono::Days::new(1)))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    // -------------------------------------------------------------------------
    // Ledger Entry Operations
    // -------------------------------------------------------------------------

    /// Create a ledger entry.
    #[instrument(skip(self, input), fields(org_id = %input.org_id))]
    pub async fn create_ledger_entry(
        &self,
        input: &CreateLedgerEntry,
    ) -> Result<LedgerEntry, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_ledger_entry"])
            .start_timer();

        let entry = Self::insert_ledger_entry(&self.pool, input).await?;

        timer.observe_duration();

        info!(entry_id = %entry.entry_id, entry_type = %entry.entry_type, "Ledger entry created");

        Ok(entry)
    }

    async fn insert_ledger_entry<'e, E>(
        executor: E,
        input: &CreateLedgerEntry,
    ) -> Result<LedgerEntry, AppError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            INSERT INTO ledger_entries (entry_id, org_id, client_id, entry_type, subtype,
                                        amount, description, category, entry_date,
                                        invoice_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.org_id)
        .bind(input.client_id)
        .bind(input.entry_type.as_str())
        .bind(&input.subtype)
        .bind(input.amount)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.entry_date)
        .bind(input.invoice_id)
        .bind(input.status.as_str())
        .fetch_one(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create entry: {}", e)))
    }

    /// Filtered read over active ledger entries.
    #[instrument(skip(self, filter), fields(org_id = %org_id))]
    pub async fn find_ledger_entries(
        &self,
        org_id: Uuid,
        filter: &LedgerEntryFilter,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_ledger_entries"])
            .start_timer();

        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE org_id = $1
              AND deleted_at IS NULL
              AND ($2::varchar IS NULL OR entry_type = $2)
              AND ($3::varchar IS NULL OR status = $3)
              AND ($4::uuid IS NULL OR client_id = $4)
              AND ($5::date IS NULL OR entry_date >= $5)
              AND ($6::date IS NULL OR entry_date <= $6)
              AND ($7::varchar IS NULL OR description LIKE $7)
            ORDER BY entry_date, entry_id
            "#
        ))
        .bind(org_id)
        .bind(filter.entry_type.map(|t| t.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.client_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.description_like)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list entries: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    /// Confirmed sum of one entry type inside a date window.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn sum_confirmed_entries(
        &self,
        org_id: Uuid,
        entry_type: EntryType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sum_confirmed_entries"])
            .start_timer();

        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM ledger_entries
            WHERE org_id = $1 AND entry_type = $2 AND status = 'confirmed'
              AND entry_date >= $3 AND entry_date <= $4
              AND deleted_at IS NULL
            "#,
        )
        .bind(org_id)
        .bind(entry_type.as_str())
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum entries: {}", e)))?;

        timer.observe_duration();

        Ok(total)
    }

    /// Confirmed entries of one type inside the search window but outside
    /// the target month, ordered oldest-first then largest-amount-first.
    /// These are the reconciliation move candidates.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_move_candidates(
        &self,
        org_id: Uuid,
        entry_type: EntryType,
        window_from: NaiveDate,
        window_to: NaiveDate,
        month_from: NaiveDate,
        month_to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_move_candidates"])
            .start_timer();

        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE org_id = $1 AND entry_type = $2 AND status = 'confirmed'
              AND entry_date >= $3 AND entry_date <= $4
              AND (entry_date < $5 OR entry_date > $6)
              AND deleted_at IS NULL
            ORDER BY entry_date ASC, amount DESC, entry_id
            "#
        ))
        .bind(org_id)
        .bind(entry_type.as_str())
        .bind(window_from)
        .bind(window_to)
        .bind(month_from)
        .bind(month_to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list move candidates: {}", e))
        })?;

        timer.observe_duration();

        Ok(entries)
    }

    /// Move an entry's date. Amounts are immutable; the date is the only
    /// field reconciliation is allowed to touch.
    #[instrument(skip(self), fields(org_id = %org_id, entry_id = %entry_id))]
    pub async fn update_entry_date(
        &self,
        org_id: Uuid,
        entry_id: Uuid,
        new_date: NaiveDate,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_entry_date"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET entry_date = $1
            WHERE org_id = $2 AND entry_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(new_date)
        .bind(org_id)
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update entry date: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() == 1)
    }

    /// Whether a client already has a matching income entry this period.
    /// The idempotency guard for the monthly scheduler.
    #[instrument(skip(self, description_pattern), fields(org_id = %org_id, client_id = %client_id))]
    pub async fn monthly_entry_exists(
        &self,
        org_id: Uuid,
        client_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        description_pattern: &str,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["monthly_entry_exists"])
            .start_timer();

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ledger_entries
                WHERE org_id = $1 AND client_id = $2 AND entry_type = 'income'
                  AND entry_date >= $3 AND entry_date <= $4
                  AND description LIKE $5
                  AND status <> 'cancelled'
                  AND deleted_at IS NULL
            )
            "#,
        )
        .bind(org_id)
        .bind(client_id)
        .bind(from)
        .bind(to)
        .bind(description_pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Monthly entry search failed: {}", e))
        })?;

        timer.observe_duration();

        Ok(exists)
    }

    // -------------------------------------------------------------------------
    // Installment Operations
    // -------------------------------------------------------------------------

    /// All installments for an org, oldest due first.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn find_installments(&self, org_id: Uuid) -> Result<Vec<Installment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_installments"])
            .start_timer();

        let installments = sqlx::query_as::<_, Installment>(&format!(
            r#"
            SELECT {INSTALLMENT_COLUMNS}
            FROM installments
            WHERE org_id = $1
            ORDER BY due_date, number
            "#
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list installments: {}", e))
        })?;

        timer.observe_duration();

        Ok(installments)
    }

    /// Installments for one client due inside the window.
    #[instrument(skip(self), fields(org_id = %org_id, client_id = %client_id))]
    pub async fn find_installments_due(
        &self,
        org_id: Uuid,
        client_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Installment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_installments_due"])
            .start_timer();

        let installments = sqlx::query_as::<_, Installment>(&format!(
            r#"
            SELECT {INSTALLMENT_COLUMNS}
            FROM installments
            WHERE org_id = $1 AND client_id = $2
              AND due_date >= $3 AND due_date <= $4
            ORDER BY due_date, number
            "#
        ))
        .bind(org_id)
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list installments: {}", e))
        })?;

        timer.observe_duration();

        Ok(installments)
    }

    /// One installment, org-scoped.
    #[instrument(skip(self), fields(org_id = %org_id, installment_id = %installment_id))]
    pub async fn find_installment(
        &self,
        org_id: Uuid,
        installment_id: Uuid,
    ) -> Result<Option<Installment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_installment"])
            .start_timer();

        let installment = sqlx::query_as::<_, Installment>(&format!(
            r#"
            SELECT {INSTALLMENT_COLUMNS}
            FROM installments
            WHERE org_id = $1 AND installment_id = $2
            "#
        ))
        .bind(org_id)
        .bind(installment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get installment: {}", e)))?;

        timer.observe_duration();

        Ok(installment)
    }

    /// Flip a pending installment to late. No-op when already late or
    /// confirmed, so the sweep stays idempotent.
    #[instrument(skip(self), fields(org_id = %org_id, installment_id = %installment_id))]
    pub async fn mark_installment_late(
        &self,
        org_id: Uuid,
        installment_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_installment_late"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE installments
            SET status = 'late'
            WHERE org_id = $1 AND installment_id = $2 AND status = 'pending'
            "#,
        )
        .bind(org_id)
        .bind(installment_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark installment late: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() == 1)
    }

    /// Confirm an installment and create its income entry atomically.
    ///
    /// The status flip and the ledger insert live in one transaction: a
    /// partial apply (status flipped but no ledger row, or the reverse) is
    /// the failure mode this method exists to prevent. Returns `None` when
    /// the installment was already confirmed by a concurrent caller.
    #[instrument(skip(self, entry), fields(org_id = %org_id, installment_id = %installment_id))]
    pub async fn confirm_installment(
        &self,
        org_id: Uuid,
        installment_id: Uuid,
        paid_at: DateTime<Utc>,
        entry: &CreateLedgerEntry,
    ) -> Result<Option<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["confirm_installment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let updated = sqlx::query(
            r#"
            UPDATE installments
            SET status = 'confirmed', paid_at = $1
            WHERE org_id = $2 AND installment_id = $3 AND status <> 'confirmed'
            "#,
        )
        .bind(paid_at)
        .bind(org_id)
        .bind(installment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to confirm installment: {}", e))
        })?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        }

        let ledger_entry = Self::insert_ledger_entry(&mut *tx, entry).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit confirmation: {}", e))
        })?;

        timer.observe_duration();

        info!(
            installment_id = %installment_id,
            entry_id = %ledger_entry.entry_id,
            "Installment confirmed with income entry"
        );

        Ok(Some(ledger_entry))
    }

    // -------------------------------------------------------------------------
    // Sync Task Operations
    // -------------------------------------------------------------------------

    /// Queue a downstream sync write for retry.
    #[instrument(skip(self, payload), fields(org_id = %org_id, kind = kind))]
    pub async fn enqueue_sync_task(
        &self,
        org_id: Uuid,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<SyncTask, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["enqueue_sync_task"])
            .start_timer();

        let task = sqlx::query_as::<_, SyncTask>(
            r#"
            INSERT INTO sync_tasks (task_id, org_id, kind, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING task_id, org_id, kind, payload, attempts, status, last_error,
                      next_attempt_at, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(kind)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to enqueue task: {}", e)))?;

        timer.observe_duration();

        Ok(task)
    }

    /// Pending tasks whose next attempt is due.
    #[instrument(skip(self))]
    pub async fn due_sync_tasks(&self, limit: i64) -> Result<Vec<SyncTask>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["due_sync_tasks"])
            .start_timer();

        let tasks = sqlx::query_as::<_, SyncTask>(
            r#"
            SELECT task_id, org_id, kind, payload, attempts, status, last_error,
                   next_attempt_at, created_utc
            FROM sync_tasks
            WHERE status = 'pending' AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tasks: {}", e)))?;

        timer.observe_duration();

        Ok(tasks)
    }

    /// Remove a task after a successful apply.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn complete_sync_task(&self, task_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sync_tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete task: {}", e)))?;
        Ok(())
    }

    /// Record a failed attempt: either reschedule or mark permanently failed.
    #[instrument(skip(self, error), fields(task_id = %task_id))]
    pub async fn record_sync_failure(
        &self,
        task_id: Uuid,
        attempts: i32,
        error: &str,
        disposition: SyncTaskStatus,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sync_tasks
            SET attempts = $1, last_error = $2, status = $3, next_attempt_at = $4
            WHERE task_id = $5
            "#,
        )
        .bind(attempts)
        .bind(error)
        .bind(disposition.as_str())
        .bind(next_attempt_at)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record sync failure: {}", e))
        })?;
        Ok(())
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0).unwrap(), Utc)
}
