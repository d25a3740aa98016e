//! Settlement Orchestrator
//!
//! Settling a clinical event moves it from unpaid to paid. Inside one unit of
//! work the orchestrator:
//!
//! 1. loads and locks the event
//! 2. rejects it if it is already paid
//! 3. resolves its price
//! 4. flips its paid flag
//! 5. creates an invoice with a single line item
//! 6. records a payment for the full amount
//!
//! Any failure rolls the whole unit back, so an event is observed either
//! unpaid with no invoice, or paid with a fully paid invoice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use core_kernel::{AppointmentId, LabRequestId, PatientId, PortError, UserId};

use crate::catalog::{resolve_active_price, PriceListing, PriceType};
use crate::clinical::{Appointment, BillingSource, LabRequest};
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceDraft, InvoiceLedger};
use crate::payment::{Payment, PaymentRecorder};
use crate::ports::{complete_unit, BillingStore, BillingTx};

/// Outcome of a successful settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement<E> {
    /// The event, with its paid flag set
    pub event: E,
    pub invoice: Invoice,
    pub payment: Payment,
}

/// A clinical event that can be settled
///
/// Implementations differ only in how the event is loaded, how its price is
/// resolved and how the line item is worded.
#[async_trait]
pub trait SettlementTarget: Send + Sync {
    type Event: Send + Sync;

    /// Source reference recorded on the invoice
    fn source(&self) -> BillingSource;

    /// Loads the event under a row lock
    ///
    /// # Errors
    ///
    /// `NotFound` if the event does not exist.
    async fn load(&self, tx: &mut dyn BillingTx) -> Result<Self::Event, BillingError>;

    fn is_paid(event: &Self::Event) -> bool;

    fn patient_id(event: &Self::Event) -> PatientId;

    async fn resolve_price(
        &self,
        tx: &mut dyn BillingTx,
        event: &Self::Event,
    ) -> Result<PriceListing, BillingError>;

    fn describe_line_item(event: &Self::Event, price: &PriceListing) -> String;

    /// Flips the event's paid flag
    ///
    /// # Errors
    ///
    /// `AlreadyPaid` if the stored flag is already set.
    async fn mark_paid(
        &self,
        tx: &mut dyn BillingTx,
        event: &mut Self::Event,
    ) -> Result<(), BillingError>;
}

/// Appointment settlement, priced by the canonical active appointment fee
#[derive(Debug, Clone, Copy)]
pub struct AppointmentTarget(pub AppointmentId);

#[async_trait]
impl SettlementTarget for AppointmentTarget {
    type Event = Appointment;

    fn source(&self) -> BillingSource {
        BillingSource::Appointment(self.0)
    }

    async fn load(&self, tx: &mut dyn BillingTx) -> Result<Appointment, BillingError> {
        tx.lock_appointment(self.0)
            .await?
            .ok_or_else(|| BillingError::not_found("Appointment", self.0))
    }

    fn is_paid(event: &Appointment) -> bool {
        event.is_paid
    }

    fn patient_id(event: &Appointment) -> PatientId {
        event.patient_id
    }

    async fn resolve_price(
        &self,
        tx: &mut dyn BillingTx,
        _event: &Appointment,
    ) -> Result<PriceListing, BillingError> {
        resolve_active_price(tx, PriceType::Appointment).await
    }

    fn describe_line_item(event: &Appointment, _price: &PriceListing) -> String {
        format!("Appointment with {}", event.doctor_name)
    }

    async fn mark_paid(
        &self,
        tx: &mut dyn BillingTx,
        event: &mut Appointment,
    ) -> Result<(), BillingError> {
        tx.mark_appointment_paid(self.0).await.map_err(|err| {
            if err.is_conflict() {
                BillingError::already_paid("Appointment", self.0)
            } else {
                BillingError::from(err)
            }
        })?;
        event.is_paid = true;
        Ok(())
    }
}

/// Lab request settlement, priced by the listing captured on the request
#[derive(Debug, Clone, Copy)]
pub struct LabRequestTarget(pub LabRequestId);

#[async_trait]
impl SettlementTarget for LabRequestTarget {
    type Event = LabRequest;

    fn source(&self) -> BillingSource {
        BillingSource::LabRequest(self.0)
    }

    async fn load(&self, tx: &mut dyn BillingTx) -> Result<LabRequest, BillingError> {
        tx.lock_lab_request(self.0)
            .await?
            .ok_or_else(|| BillingError::not_found("LabRequest", self.0))
    }

    fn is_paid(event: &LabRequest) -> bool {
        event.is_paid
    }

    fn patient_id(event: &LabRequest) -> PatientId {
        event.patient_id
    }

    async fn resolve_price(
        &self,
        tx: &mut dyn BillingTx,
        event: &LabRequest,
    ) -> Result<PriceListing, BillingError> {
        // The linked listing is used even if it has since been deactivated.
        match tx.price_by_id(event.price_id).await? {
            Some(price) if price.price_type == PriceType::Lab => Ok(price),
            Some(price) => Err(BillingError::PricingNotConfigured {
                price_type: PriceType::Lab,
                detail: format!(
                    "{} links {} which is a {} listing",
                    event.id, price.id, price.price_type
                ),
            }),
            None => Err(BillingError::PricingNotConfigured {
                price_type: PriceType::Lab,
                detail: format!("{} links missing listing {}", event.id, event.price_id),
            }),
        }
    }

    fn describe_line_item(_event: &LabRequest, price: &PriceListing) -> String {
        format!("Lab Test: {}", price.name)
    }

    async fn mark_paid(
        &self,
        tx: &mut dyn BillingTx,
        event: &mut LabRequest,
    ) -> Result<(), BillingError> {
        tx.mark_lab_request_paid(self.0).await.map_err(|err| {
            if err.is_conflict() {
                BillingError::already_paid("LabRequest", self.0)
            } else {
                BillingError::from(err)
            }
        })?;
        event.is_paid = true;
        Ok(())
    }
}

/// Runs settlements as single units of work
pub struct SettlementOrchestrator;

impl SettlementOrchestrator {
    /// Settles a clinical event
    ///
    /// # Arguments
    ///
    /// * `store` - Storage handle the unit of work is opened on
    /// * `target` - The event to settle
    /// * `cashier_id` - Acting cashier, recorded on the payment
    ///
    /// # Errors
    ///
    /// `NotFound`, `AlreadyPaid`, `PricingNotConfigured`, or
    /// `PersistenceFailure`. No change is visible after any error.
    #[instrument(skip(store, target), fields(source = %target.source(), cashier_id = %cashier_id))]
    pub async fn settle<T: SettlementTarget>(
        store: &dyn BillingStore,
        target: &T,
        cashier_id: UserId,
    ) -> Result<Settlement<T::Event>, BillingError> {
        let mut tx = store.begin().await?;
        let result = Self::settle_in(tx.as_mut(), target, cashier_id).await;
        let outcome = match result {
            Ok(settlement) => tx
                .commit()
                .await
                .map(|()| settlement)
                .map_err(|err| commit_error(err, target.source())),
            Err(err) => complete_unit(tx, Err(err), "settle").await,
        };

        match &outcome {
            Ok(settlement) => info!(
                invoice_id = %settlement.invoice.id,
                payment_id = %settlement.payment.id,
                amount = %settlement.payment.amount,
                "settlement committed"
            ),
            Err(err) if err.is_operational() => {
                error!(error = %err, kind = %err.kind(), "settlement failed")
            }
            Err(err) => warn!(error = %err, kind = %err.kind(), "settlement rejected"),
        }
        outcome
    }

    async fn settle_in<T: SettlementTarget>(
        tx: &mut dyn BillingTx,
        target: &T,
        cashier_id: UserId,
    ) -> Result<Settlement<T::Event>, BillingError> {
        let mut event = target.load(tx).await?;
        if T::is_paid(&event) {
            let source = target.source();
            return Err(BillingError::already_paid(source.entity(), source));
        }

        let price = target.resolve_price(tx, &event).await?;
        target.mark_paid(tx, &mut event).await?;

        let draft = InvoiceDraft::for_patient(T::patient_id(&event))
            .with_item(T::describe_line_item(&event, &price), price.amount);
        let invoice = InvoiceLedger::create_for_source(tx, draft, target.source()).await?;

        let receipt =
            PaymentRecorder::add_payment(tx, invoice.id, price.amount, Some(cashier_id)).await?;

        Ok(Settlement {
            event,
            invoice: receipt.invoice,
            payment: receipt.payment,
        })
    }
}/// A uniqueness conflict at commit means another unit invoiced the event first
fn commit_error(err: PortError, source: BillingSource) -> BillingError {
    if err.is_conflict() {
        BillingError::already_paid(source.entity(), source)
    } else {
        BillingError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingErrorKind;

    #[test]
    fn test_commit_conflict_is_already_paid() {
        let source = BillingSource::Appointment(AppointmentId::new(7));
        let err = commit_error(PortError::conflict("APT-7 is already invoiced"), source);
        assert_eq!(err.kind(), BillingErrorKind::AlreadyPaid);
    }

    #[test]
    fn test_other_commit_failures_stay_operational() {
        let source = BillingSource::LabRequest(LabRequestId::new(11));
        let err = commit_error(PortError::connection("connection reset"), source);
        assert_eq!(err.kind(), BillingErrorKind::PersistenceFailure);
    }
}
