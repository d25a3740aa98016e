//! Billing application service
//!
//! `BillingService` is the facade the HTTP layer talks to. It owns the
//! storage handle and opens one unit of work per write operation.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use core_kernel::{
    AppointmentId, HealthCheckResult, InvoiceId, LabRequestId, Money, MoneyError, PortError,
    PriceId, UserId,
};

use crate::catalog::{NewPriceListing, PriceListing, PriceQuery, PriceType, PriceUpdate};
use crate::clinical::{Appointment, LabRequest};
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceDetails, InvoiceDraft, InvoiceLedger, InvoiceQuery};
use crate::payment::{Payment, PaymentQuery, PaymentReceipt, PaymentRecorder};
use crate::ports::{complete_unit, BillingStore, BillingTx};
use crate::reporting::{self, CashierTotal, DateRange, FinancialSummary};
use crate::settlement::{AppointmentTarget, LabRequestTarget, Settlement, SettlementOrchestrator};

/// Billing operations over an explicitly provided store
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn BillingStore>,
}

impl BillingService {
    /// Creates a service over a storage handle
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying storage handle
    pub fn store(&self) -> &Arc<dyn BillingStore> {
        &self.store
    }

    /// Settles an appointment at the canonical appointment fee
    ///
    /// # Arguments
    ///
    /// * `appointment_id` - Appointment to settle
    /// * `cashier_id` - Acting cashier from the verified role claim
    pub async fn settle_appointment(
        &self,
        appointment_id: AppointmentId,
        cashier_id: UserId,
    ) -> Result<Settlement<Appointment>, BillingError> {
        SettlementOrchestrator::settle(
            self.store.as_ref(),
            &AppointmentTarget(appointment_id),
            cashier_id,
        )
        .await
    }

    /// Settles a lab request at the price linked on the request
    pub async fn settle_lab_request(
        &self,
        lab_request_id: LabRequestId,
        cashier_id: UserId,
    ) -> Result<Settlement<LabRequest>, BillingError> {
        SettlementOrchestrator::settle(
            self.store.as_ref(),
            &LabRequestTarget(lab_request_id),
            cashier_id,
        )
        .await
    }

    /// Creates an unpaid invoice in its own unit of work
    #[instrument(skip(self, draft), fields(patient_id = ?draft.patient_id, items = draft.items.len()))]
    pub async fn create_invoice(&self, draft: InvoiceDraft) -> Result<Invoice, BillingError> {
        let mut tx = self.store.begin().await?;
        let result = InvoiceLedger::create_invoice(tx.as_mut(), draft).await;
        complete_unit(tx, result, "create_invoice").await
    }

    /// Records a payment against an invoice in its own unit of work
    #[instrument(skip(self), fields(invoice_id = %invoice_id, amount = %amount))]
    pub async fn add_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Money,
        cashier_id: Option<UserId>,
    ) -> Result<PaymentReceipt, BillingError> {
        let mut tx = self.store.begin().await?;
        let result = PaymentRecorder::add_payment(tx.as_mut(), invoice_id, amount, cashier_id).await;
        complete_unit(tx, result, "add_payment").await
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        InvoiceLedger::get_invoice(self.store.as_ref(), id).await
    }

    /// Loads an invoice with payments, amount paid and balance due
    pub async fn get_invoice_details(&self, id: InvoiceId) -> Result<InvoiceDetails, BillingError> {
        InvoiceLedger::invoice_details(self.store.as_ref(), id).await
    }

    /// Lists invoices, newest first
    pub async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, BillingError> {
        InvoiceLedger::list_invoices(self.store.as_ref(), query).await
    }

    pub async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, BillingError> {
        Ok(self.store.list_payments(query).await?)
    }

    pub async fn list_prices(&self, query: &PriceQuery) -> Result<Vec<PriceListing>, BillingError> {
        Ok(self.store.list_prices(query).await?)
    }

    /// Adds a catalog listing
    ///
    /// # Errors
    ///
    /// `InvalidPriceData` for malformed input, a duplicate code within the
    /// type, or a second active appointment listing.
    #[instrument(skip(self, new), fields(price_type = %new.price_type, code = %new.code))]
    pub async fn create_price(&self, new: NewPriceListing) -> Result<PriceListing, BillingError> {
        new.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::create_price_in(tx.as_mut(), &new).await;
        let listing = Self::finish_price_unit(tx, result, "create_price").await?;

        info!(price_id = %listing.id, amount = %listing.amount, "price created");
        Ok(listing)
    }

    async fn create_price_in(
        tx: &mut dyn BillingTx,
        new: &NewPriceListing,
    ) -> Result<PriceListing, BillingError> {
        if new.active && new.price_type == PriceType::Appointment {
            ensure_no_other_active_appointment(tx, None).await?;
        }
        tx.insert_price(new).await.map_err(price_conflict)
    }

    /// Edits name, amount or active flag of a listing
    ///
    /// Invoices already issued keep the amount they were created with.
    #[instrument(skip(self, update), fields(price_id = %id))]
    pub async fn update_price(
        &self,
        id: PriceId,
        update: PriceUpdate,
    ) -> Result<PriceListing, BillingError> {
        update.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::update_price_in(tx.as_mut(), id, &update).await;
        let listing = Self::finish_price_unit(tx, result, "update_price").await?;

        info!(amount = %listing.amount, active = listing.active, "price updated");
        Ok(listing)
    }

    async fn update_price_in(
        tx: &mut dyn BillingTx,
        id: PriceId,
        update: &PriceUpdate,
    ) -> Result<PriceListing, BillingError> {
        let mut listing = tx
            .lock_price(id)
            .await?
            .ok_or_else(|| BillingError::not_found("Price", id))?;

        if update.activates() && !listing.active && listing.price_type == PriceType::Appointment {
            ensure_no_other_active_appointment(tx, Some(id)).await?;
        }

        update.apply(&mut listing, chrono::Utc::now());
        tx.update_price(&listing).await.map_err(price_conflict)
    }

    async fn finish_price_unit(
        mut tx: Box<dyn BillingTx>,
        result: Result<PriceListing, BillingError>,
        operation: &'static str,
    ) -> Result<PriceListing, BillingError> {
        match result {
            Ok(listing) => {
                tx.commit().await.map_err(price_conflict)?;
                Ok(listing)
            }
            Err(err) => complete_unit(tx, Err(err), operation).await,
        }
    }

    /// Builds the financial summary; revenue is the sum of payments
    #[instrument(skip(self))]
    pub async fn financial_summary(&self, range: DateRange) -> Result<FinancialSummary, BillingError> {
        let invoices = self.store.list_invoices(&InvoiceQuery::default()).await?;
        let payments = self.store.list_payments(&PaymentQuery::default()).await?;
        reporting::summarize(&invoices, &payments, range).map_err(report_overflow)
    }

    /// Totals payments per cashier within a range
    #[instrument(skip(self))]
    pub async fn payments_by_cashier(&self, range: DateRange) -> Result<Vec<CashierTotal>, BillingError> {
        let payments = self.store.list_payments(&PaymentQuery::in_range(range)).await?;
        reporting::totals_by_cashier(&payments, range).map_err(report_overflow)
    }

    /// Reports storage health
    pub async fn health(&self) -> HealthCheckResult {
        self.store.health_check().await
    }
}

async fn ensure_no_other_active_appointment(
    tx: &mut dyn BillingTx,
    except: Option<PriceId>,
) -> Result<(), BillingError> {
    match tx.active_price(PriceType::Appointment).await? {
        Some(existing) if Some(existing.id) != except => {
            warn!(existing = %existing.id, "active appointment price already configured");
            Err(BillingError::InvalidPriceData(format!(
                "{} is already the active APPOINTMENT price",
                existing.id
            )))
        }
        _ => Ok(()),
    }
}

fn price_conflict(err: PortError) -> BillingError {
    match err {
        PortError::Conflict { message } => BillingError::InvalidPriceData(message),
        other => BillingError::from(other),
    }
}

fn report_overflow(err: MoneyError) -> BillingError {
    BillingError::PersistenceFailure(format!("stored amounts cannot be totalled: {}", err))
}
