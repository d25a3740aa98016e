//! Billing repository implementation
//!
//! SQL for the price catalog, the clinical events billing reads, and the
//! invoice/payment ledger. Functions that take a `&mut PgConnection` run on
//! the connection of an open transaction; row-locking reads use
//! `FOR UPDATE` and hold the lock until that transaction ends.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};

use crate::error::DatabaseError;

const APPOINTMENT_COLUMNS: &str = r#"
    a.id, a.patient_id, a.doctor_id, d.name AS doctor_name,
    a.scheduled_at, a.is_paid, a.created_at
"#;

const PRICE_COLUMNS: &str =
    "id, price_type, code, name, amount, active, created_at, updated_at";

const INVOICE_COLUMNS: &str =
    "id, patient_id, source_type, source_id, total_amount, is_paid, created_at";

const PAYMENT_COLUMNS: &str = "id, invoice_id, amount, cashier_id, created_at";

/// Database row for an appointment, joined with the doctor's name
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub doctor_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// Database row for a lab request
#[derive(Debug, Clone, FromRow)]
pub struct LabRequestRow {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub price_id: i64,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// Database row for a catalog listing
#[derive(Debug, Clone, FromRow)]
pub struct PriceRow {
    pub id: i64,
    pub price_type: String,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for an invoice header
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: i64,
    pub patient_id: i64,
    pub source_type: Option<String>,
    pub source_id: Option<i64>,
    pub total_amount: Decimal,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// Database row for an invoice line
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceItemRow {
    pub id: i64,
    pub invoice_id: i64,
    pub description: String,
    pub amount: Decimal,
}

/// Database row for a payment
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: Decimal,
    pub cashier_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Data for inserting a catalog listing
#[derive(Debug, Clone)]
pub struct NewPriceRow {
    pub price_type: String,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
    pub active: bool,
}

/// Optional filters for payment listing; bounds are `[from, to)`
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub invoice_id: Option<i64>,
    pub cashier_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Repository for the billing ledger
///
/// Holds the pool for committed reads. Transactional operations are
/// associated functions taking the transaction's connection.
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    /// Creates a new BillingRepository with the given connection pool
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------------
    // Committed reads
    // ------------------------------------------------------------------------

    pub async fn get_appointment(&self, id: i64) -> Result<Option<AppointmentRow>, DatabaseError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a JOIN doctors d ON d.id = a.doctor_id WHERE a.id = $1"
        );
        Ok(sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_lab_request(&self, id: i64) -> Result<Option<LabRequestRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, LabRequestRow>(
            "SELECT id, patient_id, doctor_id, price_id, is_paid, created_at FROM lab_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Lists catalog entries, optionally filtered by type and active flag
    pub async fn list_prices(
        &self,
        price_type: Option<&str>,
        active: Option<bool>,
    ) -> Result<Vec<PriceRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {PRICE_COLUMNS} FROM prices
            WHERE ($1::TEXT IS NULL OR price_type = $1)
              AND ($2::BOOLEAN IS NULL OR active = $2)
            ORDER BY id
            "#
        );
        Ok(sqlx::query_as::<_, PriceRow>(&sql)
            .bind(price_type)
            .bind(active)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_invoice(&self, id: i64) -> Result<Option<InvoiceRow>, DatabaseError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
        Ok(sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Lists invoice headers, newest first
    pub async fn list_invoices(
        &self,
        patient_id: Option<i64>,
        is_paid: Option<bool>,
    ) -> Result<Vec<InvoiceRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {INVOICE_COLUMNS} FROM invoices
            WHERE ($1::BIGINT IS NULL OR patient_id = $1)
              AND ($2::BOOLEAN IS NULL OR is_paid = $2)
            ORDER BY created_at DESC, id DESC
            "#
        );
        Ok(sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(patient_id)
            .bind(is_paid)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Loads the items of several invoices, committed state only
    pub async fn items_for_invoices(
        &self,
        invoice_ids: &[i64],
    ) -> Result<Vec<InvoiceItemRow>, DatabaseError> {
        Self::fetch_items(&self.pool, invoice_ids).await
    }

    /// Lists payments, oldest first
    pub async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE ($1::BIGINT IS NULL OR invoice_id = $1)
              AND ($2::BIGINT IS NULL OR cashier_id = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at < $4)
            ORDER BY created_at, id
            "#
        );
        Ok(sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(filter.invoice_id)
            .bind(filter.cashier_id)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Runs a trivial query to verify connectivity
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transactional operations
    // ------------------------------------------------------------------------

    /// Loads an appointment and locks its row
    pub async fn lock_appointment(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<AppointmentRow>, DatabaseError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a JOIN doctors d ON d.id = a.doctor_id WHERE a.id = $1 FOR UPDATE OF a"
        );
        Ok(sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?)
    }

    /// Flips an unpaid appointment to paid; returns false if no unpaid row matched
    pub async fn mark_appointment_paid(conn: &mut PgConnection, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE appointments SET is_paid = TRUE WHERE id = $1 AND is_paid = FALSE")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn appointment_exists(conn: &mut PgConnection, id: i64) -> Result<bool, DatabaseError> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM appointments WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?)
    }

    /// Loads a lab request and locks its row
    pub async fn lock_lab_request(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<LabRequestRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, LabRequestRow>(
            "SELECT id, patient_id, doctor_id, price_id, is_paid, created_at FROM lab_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
    }

    /// Flips an unpaid lab request to paid; returns false if no unpaid row matched
    pub async fn mark_lab_request_paid(conn: &mut PgConnection, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE lab_requests SET is_paid = TRUE WHERE id = $1 AND is_paid = FALSE")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn lab_request_exists(conn: &mut PgConnection, id: i64) -> Result<bool, DatabaseError> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM lab_requests WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?)
    }

    /// The active listing of a type
    pub async fn active_price(
        conn: &mut PgConnection,
        price_type: &str,
    ) -> Result<Option<PriceRow>, DatabaseError> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM prices WHERE price_type = $1 AND active ORDER BY id LIMIT 1"
        );
        Ok(sqlx::query_as::<_, PriceRow>(&sql)
            .bind(price_type)
            .fetch_optional(&mut *conn)
            .await?)
    }

    /// Loads a listing, optionally locking it for update
    pub async fn price_by_id(
        conn: &mut PgConnection,
        id: i64,
        for_update: bool,
    ) -> Result<Option<PriceRow>, DatabaseError> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {PRICE_COLUMNS} FROM prices WHERE id = $1{lock}");
        Ok(sqlx::query_as::<_, PriceRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?)
    }

    pub async fn insert_price(conn: &mut PgConnection, new: &NewPriceRow) -> Result<PriceRow, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO prices (price_type, code, name, amount, active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRICE_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, PriceRow>(&sql)
            .bind(&new.price_type)
            .bind(&new.code)
            .bind(&new.name)
            .bind(new.amount)
            .bind(new.active)
            .fetch_one(&mut *conn)
            .await?)
    }

    /// Updates the editable columns of a listing
    pub async fn update_price(
        conn: &mut PgConnection,
        id: i64,
        name: &str,
        amount: Decimal,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<PriceRow>, DatabaseError> {
        let sql = format!(
            r#"
            UPDATE prices SET name = $2, amount = $3, active = $4, updated_at = $5
            WHERE id = $1
            RETURNING {PRICE_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, PriceRow>(&sql)
            .bind(id)
            .bind(name)
            .bind(amount)
            .bind(active)
            .bind(updated_at)
            .fetch_optional(&mut *conn)
            .await?)
    }

    /// Inserts an invoice header
    ///
    /// A second invoice for the same source violates `invoices_source_key`
    /// and surfaces as `DatabaseError::DuplicateEntry`.
    pub async fn insert_invoice(
        conn: &mut PgConnection,
        patient_id: i64,
        source: Option<(&str, i64)>,
        total_amount: Decimal,
    ) -> Result<InvoiceRow, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO invoices (patient_id, source_type, source_id, total_amount, is_paid)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(patient_id)
            .bind(source.map(|(kind, _)| kind))
            .bind(source.map(|(_, id)| id))
            .bind(total_amount)
            .fetch_one(&mut *conn)
            .await?)
    }

    pub async fn insert_invoice_item(
        conn: &mut PgConnection,
        invoice_id: i64,
        description: &str,
        amount: Decimal,
    ) -> Result<InvoiceItemRow, DatabaseError> {
        Ok(sqlx::query_as::<_, InvoiceItemRow>(
            r#"
            INSERT INTO invoice_items (invoice_id, description, amount)
            VALUES ($1, $2, $3)
            RETURNING id, invoice_id, description, amount
            "#,
        )
        .bind(invoice_id)
        .bind(description)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?)
    }

    /// Loads an invoice header and locks its row
    pub async fn lock_invoice(conn: &mut PgConnection, id: i64) -> Result<Option<InvoiceRow>, DatabaseError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?)
    }

    /// Loads the items of an invoice on the transaction's connection
    pub async fn items_in_tx(
        conn: &mut PgConnection,
        invoice_id: i64,
    ) -> Result<Vec<InvoiceItemRow>, DatabaseError> {
        Self::fetch_items(&mut *conn, &[invoice_id]).await
    }

    pub async fn payments_total(conn: &mut PgConnection, invoice_id: i64) -> Result<Decimal, DatabaseError> {
        Ok(sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?)
    }

    pub async fn insert_payment(
        conn: &mut PgConnection,
        invoice_id: i64,
        amount: Decimal,
        cashier_id: Option<i64>,
    ) -> Result<PaymentRow, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO payments (invoice_id, amount, cashier_id)
            VALUES ($1, $2, $3)
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(invoice_id)
            .bind(amount)
            .bind(cashier_id)
            .fetch_one(&mut *conn)
            .await?)
    }

    /// Sets the paid flag; returns false if the invoice does not exist
    pub async fn set_invoice_paid(
        conn: &mut PgConnection,
        invoice_id: i64,
        is_paid: bool,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE invoices SET is_paid = $2 WHERE id = $1")
            .bind(invoice_id)
            .bind(is_paid)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_items<'e, E>(executor: E, invoice_ids: &[i64]) -> Result<Vec<InvoiceItemRow>, DatabaseError>
    where
        E: PgExecutor<'e>,
    {
        Ok(sqlx::query_as::<_, InvoiceItemRow>(
            r#"
            SELECT id, invoice_id, description, amount
            FROM invoice_items
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_id, id
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(executor)
        .await?)
    }
}
