//! PostgreSQL Billing Adapter
//!
//! Implements the billing storage ports on top of `BillingRepository`.
//!
//! # Overview
//!
//! `PostgresBillingStore` serves committed reads from the pool and opens
//! units of work as `PostgresBillingTx`, each wrapping one database
//! transaction. Row locks taken inside a unit are `SELECT ... FOR UPDATE`
//! locks, and the one-invoice-per-event rule is backed by the
//! `invoices_source_key` unique index.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::PostgresBillingStore;
//! use domain_billing::BillingService;
//! use std::sync::Arc;
//!
//! let store = PostgresBillingStore::new(pool);
//! let service = BillingService::new(Arc::new(store));
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, AppointmentId, DoctorId, DomainPort, HealthCheckResult, HealthCheckable,
    InvoiceId, InvoiceItemId, LabRequestId, Money, PatientId, PaymentId, PortError, PriceId,
    UserId,
};
use domain_billing::{
    Appointment, BillingSource, BillingStore, BillingTx, Invoice, InvoiceItem, InvoiceQuery,
    LabRequest, NewInvoice, NewPayment, NewPriceListing, Payment, PaymentQuery, PriceListing,
    PriceQuery, PriceType,
};

use crate::error::DatabaseError;
use crate::repositories::billing::{
    AppointmentRow, BillingRepository, InvoiceItemRow, InvoiceRow, LabRequestRow, NewPriceRow,
    PaymentFilter, PaymentRow, PriceRow,
};

const ADAPTER_ID: &str = "postgres-billing-store";

/// PostgreSQL-backed implementation of `BillingStore`
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - unique and check violations -> `PortError::Conflict`
/// - foreign key violations -> `PortError::Validation`
/// - connection failures and pool exhaustion -> `PortError::Connection`
/// - other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    repository: BillingRepository,
    pool: PgPool,
}

impl PostgresBillingStore {
    /// Creates a new PostgreSQL billing store
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &BillingRepository {
        &self.repository
    }

    async fn attach_items(&self, rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>, PortError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let items = self
            .repository
            .items_for_invoices(&ids)
            .await
            .map_err(db_to_port_error)?;

        let mut grouped: HashMap<i64, Vec<InvoiceItemRow>> = HashMap::new();
        for item in items {
            grouped.entry(item.invoice_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let items = grouped.remove(&row.id).unwrap_or_default();
                row_to_invoice(row, items)
            })
            .collect()
    }
}

// Mark as a domain port
impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    /// Checks database connectivity with `SELECT 1`
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn BillingTx>, PortError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        debug!("Opened billing transaction");
        Ok(Box::new(PostgresBillingTx { tx: Some(tx) }))
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        let row = self
            .repository
            .get_invoice(id.value())
            .await
            .map_err(db_to_port_error)?;
        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let rows = self
            .repository
            .list_invoices(query.patient_id.map(|id| id.value()), query.is_paid)
            .await
            .map_err(db_to_port_error)?;
        self.attach_items(rows).await
    }

    #[instrument(skip(self))]
    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError> {
        let filter = PaymentFilter {
            invoice_id: query.invoice_id.map(|id| id.value()),
            cashier_id: query.cashier_id.map(|id| id.value()),
            from: query.range.from,
            to: query.range.to,
        };
        let rows = self
            .repository
            .list_payments(&filter)
            .await
            .map_err(db_to_port_error)?;
        Ok(rows.into_iter().map(row_to_payment).collect())
    }

    #[instrument(skip(self))]
    async fn list_prices(&self, query: &PriceQuery) -> Result<Vec<PriceListing>, PortError> {
        let rows = self
            .repository
            .list_prices(query.price_type.map(|t| t.as_str()), query.active)
            .await
            .map_err(db_to_port_error)?;
        rows.into_iter().map(row_to_price).collect()
    }

    #[instrument(skip(self), fields(appointment_id = %id))]
    async fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, PortError> {
        let row = self
            .repository
            .get_appointment(id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(row.map(row_to_appointment))
    }

    #[instrument(skip(self), fields(lab_request_id = %id))]
    async fn get_lab_request(&self, id: LabRequestId) -> Result<Option<LabRequest>, PortError> {
        let row = self
            .repository
            .get_lab_request(id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(row.map(row_to_lab_request))
    }
}

/// One database transaction used as a billing unit of work
///
/// Dropping the unit with the transaction still open rolls it back.
pub struct PostgresBillingTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresBillingTx {
    fn conn(&mut self) -> Result<&mut PgConnection, PortError> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(PortError::internal("unit of work already finished")),
        }
    }

    async fn load_invoice(&mut self, row: InvoiceRow) -> Result<Invoice, PortError> {
        let items = BillingRepository::items_in_tx(self.conn()?, row.id)
            .await
            .map_err(db_to_port_error)?;
        row_to_invoice(row, items)
    }
}

#[async_trait]
impl BillingTx for PostgresBillingTx {
    #[instrument(skip(self), fields(appointment_id = %id))]
    async fn lock_appointment(&mut self, id: AppointmentId) -> Result<Option<Appointment>, PortError> {
        let row = BillingRepository::lock_appointment(self.conn()?, id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(row.map(row_to_appointment))
    }

    #[instrument(skip(self), fields(appointment_id = %id))]
    async fn mark_appointment_paid(&mut self, id: AppointmentId) -> Result<(), PortError> {
        let conn = self.conn()?;
        let flipped = BillingRepository::mark_appointment_paid(&mut *conn, id.value())
            .await
            .map_err(db_to_port_error)?;
        if flipped {
            return Ok(());
        }
        let exists = BillingRepository::appointment_exists(conn, id.value())
            .await
            .map_err(db_to_port_error)?;
        if exists {
            Err(PortError::conflict(format!("{} is already paid", id)))
        } else {
            Err(PortError::not_found("Appointment", id))
        }
    }

    #[instrument(skip(self), fields(lab_request_id = %id))]
    async fn lock_lab_request(&mut self, id: LabRequestId) -> Result<Option<LabRequest>, PortError> {
        let row = BillingRepository::lock_lab_request(self.conn()?, id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(row.map(row_to_lab_request))
    }

    #[instrument(skip(self), fields(lab_request_id = %id))]
    async fn mark_lab_request_paid(&mut self, id: LabRequestId) -> Result<(), PortError> {
        let conn = self.conn()?;
        let flipped = BillingRepository::mark_lab_request_paid(&mut *conn, id.value())
            .await
            .map_err(db_to_port_error)?;
        if flipped {
            return Ok(());
        }
        let exists = BillingRepository::lab_request_exists(conn, id.value())
            .await
            .map_err(db_to_port_error)?;
        if exists {
            Err(PortError::conflict(format!("{} is already paid", id)))
        } else {
            Err(PortError::not_found("LabRequest", id))
        }
    }

    #[instrument(skip(self))]
    async fn active_price(&mut self, price_type: PriceType) -> Result<Option<PriceListing>, PortError> {
        BillingRepository::active_price(self.conn()?, price_type.as_str())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_price)
            .transpose()
    }

    #[instrument(skip(self), fields(price_id = %id))]
    async fn price_by_id(&mut self, id: PriceId) -> Result<Option<PriceListing>, PortError> {
        BillingRepository::price_by_id(self.conn()?, id.value(), false)
            .await
            .map_err(db_to_port_error)?
            .map(row_to_price)
            .transpose()
    }

    #[instrument(skip(self), fields(price_id = %id))]
    async fn lock_price(&mut self, id: PriceId) -> Result<Option<PriceListing>, PortError> {
        BillingRepository::price_by_id(self.conn()?, id.value(), true)
            .await
            .map_err(db_to_port_error)?
            .map(row_to_price)
            .transpose()
    }

    #[instrument(skip(self, new), fields(code = %new.code))]
    async fn insert_price(&mut self, new: &NewPriceListing) -> Result<PriceListing, PortError> {
        let row = NewPriceRow {
            price_type: new.price_type.as_str().to_string(),
            code: new.code.clone(),
            name: new.name.clone(),
            amount: new.amount.amount(),
            active: new.active,
        };
        let inserted = BillingRepository::insert_price(self.conn()?, &row)
            .await
            .map_err(db_to_port_error)?;
        row_to_price(inserted)
    }

    #[instrument(skip(self, listing), fields(price_id = %listing.id))]
    async fn update_price(&mut self, listing: &PriceListing) -> Result<PriceListing, PortError> {
        let updated = BillingRepository::update_price(
            self.conn()?,
            listing.id.value(),
            &listing.name,
            listing.amount.amount(),
            listing.active,
            listing.updated_at,
        )
        .await
        .map_err(db_to_port_error)?
        .ok_or_else(|| PortError::not_found("Price", listing.id))?;
        row_to_price(updated)
    }

    #[instrument(skip(self, new), fields(patient_id = %new.patient_id()))]
    async fn insert_invoice(&mut self, new: &NewInvoice) -> Result<Invoice, PortError> {
        let conn = self.conn()?;
        let source = new.source().map(|s| (s.kind(), s.raw_id()));
        let header = BillingRepository::insert_invoice(
            &mut *conn,
            new.patient_id().value(),
            source,
            new.total_amount().amount(),
        )
        .await
        .map_err(db_to_port_error)?;

        let mut items = Vec::with_capacity(new.items().len());
        for item in new.items() {
            let row = BillingRepository::insert_invoice_item(
                &mut *conn,
                header.id,
                &item.description,
                item.amount.amount(),
            )
            .await
            .map_err(db_to_port_error)?;
            items.push(row);
        }

        debug!(invoice_id = header.id, items = items.len(), "Inserted invoice");
        row_to_invoice(header, items)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        let row = BillingRepository::lock_invoice(self.conn()?, id.value())
            .await
            .map_err(db_to_port_error)?;
        match row {
            Some(row) => Ok(Some(self.load_invoice(row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn payments_total(&mut self, id: InvoiceId) -> Result<Money, PortError> {
        let total = BillingRepository::payments_total(self.conn()?, id.value())
            .await
            .map_err(db_to_port_error)?;
        Ok(Money::new(total))
    }

    #[instrument(skip(self, new), fields(invoice_id = %new.invoice_id, amount = %new.amount))]
    async fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, PortError> {
        let row = BillingRepository::insert_payment(
            self.conn()?,
            new.invoice_id.value(),
            new.amount.amount(),
            new.cashier_id.map(|id| id.value()),
        )
        .await
        .map_err(db_to_port_error)?;
        Ok(row_to_payment(row))
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn set_invoice_paid(&mut self, id: InvoiceId, is_paid: bool) -> Result<(), PortError> {
        let updated = BillingRepository::set_invoice_paid(self.conn()?, id.value(), is_paid)
            .await
            .map_err(db_to_port_error)?;
        if updated {
            Ok(())
        } else {
            Err(PortError::not_found("Invoice", id))
        }
    }

    async fn commit(&mut self) -> Result<(), PortError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| PortError::internal("unit of work already finished"))?;
        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))
    }

    async fn rollback(&mut self) -> Result<(), PortError> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| db_to_port_error(DatabaseError::from(e))),
            None => Ok(()),
        }
    }
}

/// Converts a DatabaseError to a PortError
fn db_to_port_error(e: DatabaseError) -> PortError {
    match e {
        DatabaseError::NotFound(entity) => PortError::not_found(entity, "unknown"),
        DatabaseError::DuplicateEntry(msg) | DatabaseError::ConstraintViolation(msg) => {
            PortError::conflict(msg)
        }
        DatabaseError::ForeignKeyViolation(msg) => PortError::validation(msg),
        DatabaseError::ConnectionFailed(msg) => PortError::connection(msg),
        DatabaseError::PoolExhausted => PortError::timeout("waiting for a pooled connection"),
        other => {
            warn!(error = %other, "Unexpected database error");
            PortError::internal(other.to_string())
        }
    }
}

fn row_to_appointment(row: AppointmentRow) -> Appointment {
    Appointment {
        id: AppointmentId::new(row.id),
        patient_id: PatientId::new(row.patient_id),
        doctor_id: DoctorId::new(row.doctor_id),
        doctor_name: row.doctor_name,
        scheduled_at: row.scheduled_at,
        is_paid: row.is_paid,
        created_at: row.created_at,
    }
}

fn row_to_lab_request(row: LabRequestRow) -> LabRequest {
    LabRequest {
        id: LabRequestId::new(row.id),
        patient_id: PatientId::new(row.patient_id),
        doctor_id: row.doctor_id.map(DoctorId::new),
        price_id: PriceId::new(row.price_id),
        is_paid: row.is_paid,
        created_at: row.created_at,
    }
}

fn row_to_price(row: PriceRow) -> Result<PriceListing, PortError> {
    let price_type = row
        .price_type
        .parse::<PriceType>()
        .map_err(|e| PortError::internal(format!("price {}: {}", row.id, e)))?;
    Ok(PriceListing {
        id: PriceId::new(row.id),
        price_type,
        code: row.code,
        name: row.name,
        amount: Money::new(row.amount),
        active: row.active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_invoice(row: InvoiceRow, items: Vec<InvoiceItemRow>) -> Result<Invoice, PortError> {
    let source = match (row.source_type.as_deref(), row.source_id) {
        (Some(kind), Some(source_id)) => Some(BillingSource::from_parts(kind, source_id).ok_or_else(
            || PortError::internal(format!("invoice {}: unknown source type '{}'", row.id, kind)),
        )?),
        _ => None,
    };
    Ok(Invoice {
        id: InvoiceId::new(row.id),
        patient_id: PatientId::new(row.patient_id),
        source,
        total_amount: Money::new(row.total_amount),
        is_paid: row.is_paid,
        created_at: row.created_at,
        items: items.into_iter().map(row_to_item).collect(),
    })
}

fn row_to_item(row: InvoiceItemRow) -> InvoiceItem {
    InvoiceItem {
        id: InvoiceItemId::new(row.id),
        invoice_id: InvoiceId::new(row.invoice_id),
        description: row.description,
        amount: Money::new(row.amount),
    }
}

fn row_to_payment(row: PaymentRow) -> Payment {
    Payment {
        id: PaymentId::new(row.id),
        invoice_id: InvoiceId::new(row.invoice_id),
        amount: Money::new(row.amount),
        cashier_id: row.cashier_id.map(UserId::new),
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    mod error_mapping_tests {
        use super::*;

        #[test]
        fn test_duplicate_maps_to_conflict() {
            let err = db_to_port_error(DatabaseError::DuplicateEntry("invoices_source_key".into()));
            assert!(err.is_conflict());
        }

        #[test]
        fn test_pool_timeout_maps_to_timeout() {
            let err = db_to_port_error(DatabaseError::from(&sqlx::Error::PoolTimedOut));
            assert!(matches!(err, PortError::Timeout { .. }));
        }

        #[test]
        fn test_connection_failures_are_transient() {
            assert!(db_to_port_error(DatabaseError::PoolExhausted).is_transient());
            assert!(db_to_port_error(DatabaseError::ConnectionFailed("reset".into())).is_transient());
        }

        #[test]
        fn test_foreign_key_maps_to_validation() {
            let err = db_to_port_error(DatabaseError::ForeignKeyViolation("patients".into()));
            assert!(matches!(err, PortError::Validation { .. }));
        }

        #[test]
        fn test_query_failure_maps_to_internal() {
            let err = db_to_port_error(DatabaseError::QueryFailed("syntax".into()));
            assert!(matches!(err, PortError::Internal { .. }));
        }
    }

    mod row_conversion_tests {
        use super::*;

        fn invoice_row(source_type: Option<&str>, source_id: Option<i64>) -> InvoiceRow {
            InvoiceRow {
                id: 1,
                patient_id: 3,
                source_type: source_type.map(str::to_string),
                source_id,
                total_amount: dec!(50),
                is_paid: false,
                created_at: Utc::now(),
            }
        }

        #[test]
        fn test_invoice_source_is_rebuilt() {
            let invoice = row_to_invoice(invoice_row(Some("appointment"), Some(7)), vec![]).unwrap();
            assert_eq!(
                invoice.source,
                Some(BillingSource::Appointment(AppointmentId::new(7)))
            );
        }

        #[test]
        fn test_manual_invoice_has_no_source() {
            let invoice = row_to_invoice(invoice_row(None, None), vec![]).unwrap();
            assert!(invoice.source.is_none());
        }

        #[test]
        fn test_unknown_source_type_is_rejected() {
            assert!(row_to_invoice(invoice_row(Some("pharmacy"), Some(1)), vec![]).is_err());
        }

        #[test]
        fn test_items_are_attached() {
            let items = vec![InvoiceItemRow {
                id: 9,
                invoice_id: 1,
                description: "Appointment with Dr. Lee".into(),
                amount: dec!(50),
            }];
            let invoice = row_to_invoice(invoice_row(Some("appointment"), Some(7)), items).unwrap();
            assert_eq!(invoice.items.len(), 1);
            assert_eq!(invoice.items_total(), invoice.total_amount);
        }

        #[test]
        fn test_price_type_is_parsed() {
            let row = PriceRow {
                id: 2,
                price_type: "LAB".into(),
                code: "GLU".into(),
                name: "Glucose Test".into(),
                amount: dec!(20),
                active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            assert_eq!(row_to_price(row).unwrap().price_type, PriceType::Lab);
        }
    }
}
