//! Storage ports for the billing domain
//!
//! `BillingStore` is the explicitly passed storage handle; `BillingTx` is one
//! atomic unit of work opened from it. Every read a settlement decision
//! depends on happens through the unit, so checks and writes share one
//! isolation boundary.

use async_trait::async_trait;
use tracing::error;

use core_kernel::{
    AppointmentId, DomainPort, HealthCheckable, InvoiceId, LabRequestId, Money, PortError, PriceId,
};

use crate::catalog::{NewPriceListing, PriceListing, PriceQuery, PriceType};
use crate::clinical::{Appointment, LabRequest};
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceQuery, NewInvoice};
use crate::payment::{NewPayment, Payment, PaymentQuery};

/// Storage handle for the billing ledger
///
/// Reads here are outside any unit of work and see committed state only.
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    /// Opens a new atomic unit of work
    async fn begin(&self) -> Result<Box<dyn BillingTx>, PortError>;

    /// Loads an invoice with its items
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// Lists invoices matching the filter, newest first
    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError>;

    /// Lists payments matching the filter, oldest first
    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, PortError>;

    /// Lists catalog entries matching the filter, ordered by id
    async fn list_prices(&self, query: &PriceQuery) -> Result<Vec<PriceListing>, PortError>;

    async fn get_appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, PortError>;

    async fn get_lab_request(&self, id: LabRequestId) -> Result<Option<LabRequest>, PortError>;
}

/// One atomic unit of work against the billing ledger
///
/// `lock_*` loads hold an exclusive row lock until the unit ends. Dropping a
/// unit without calling `commit` discards every staged write.
#[async_trait]
pub trait BillingTx: Send {
    async fn lock_appointment(&mut self, id: AppointmentId) -> Result<Option<Appointment>, PortError>;

    /// Flips `is_paid` to true
    ///
    /// Returns `PortError::Conflict` if the row is already paid, so a
    /// concurrent settlement can never flip it twice.
    async fn mark_appointment_paid(&mut self, id: AppointmentId) -> Result<(), PortError>;

    async fn lock_lab_request(&mut self, id: LabRequestId) -> Result<Option<LabRequest>, PortError>;

    /// Same contract as `mark_appointment_paid`
    async fn mark_lab_request_paid(&mut self, id: LabRequestId) -> Result<(), PortError>;

    /// The active listing of the given type, if any
    async fn active_price(&mut self, price_type: PriceType) -> Result<Option<PriceListing>, PortError>;

    async fn price_by_id(&mut self, id: PriceId) -> Result<Option<PriceListing>, PortError>;

    /// Loads a listing under an exclusive lock, for editing
    async fn lock_price(&mut self, id: PriceId) -> Result<Option<PriceListing>, PortError>;

    /// Returns `PortError::Conflict` on a duplicate code or a second active
    /// appointment listing
    async fn insert_price(&mut self, new: &NewPriceListing) -> Result<PriceListing, PortError>;

    /// Persists name, amount and active flag of an existing listing
    async fn update_price(&mut self, listing: &PriceListing) -> Result<PriceListing, PortError>;

    /// Persists an invoice and all of its items
    ///
    /// Returns `PortError::Conflict` if the source event is already invoiced.
    async fn insert_invoice(&mut self, new: &NewInvoice) -> Result<Invoice, PortError>;

    /// Loads an invoice with its items under an exclusive lock
    async fn lock_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// Sum of the payments recorded against an invoice, including staged ones
    async fn payments_total(&mut self, id: InvoiceId) -> Result<Money, PortError>;

    async fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, PortError>;

    async fn set_invoice_paid(&mut self, id: InvoiceId, is_paid: bool) -> Result<(), PortError>;

    async fn commit(&mut self) -> Result<(), PortError>;

    async fn rollback(&mut self) -> Result<(), PortError>;
}

/// Ends a unit of work according to the outcome of the work done inside it
///
/// Commits on success. On failure the unit is rolled back and the original
/// error is returned; a rollback failure is only logged.
pub async fn complete_unit<T>(
    mut tx: Box<dyn BillingTx>,
    result: Result<T, BillingError>,
    operation: &'static str,
) -> Result<T, BillingError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(operation, error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
