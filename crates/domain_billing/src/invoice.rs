//! Invoice Ledger
//!
//! Invoices are created with all of their items in one step and their total
//! is fixed at creation. The paid flag is owned by the payment recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{InvoiceId, InvoiceItemId, Money, PatientId};

use crate::clinical::BillingSource;
use crate::error::BillingError;
use crate::payment::{Payment, PaymentQuery};
use crate::ports::{BillingStore, BillingTx};

/// An invoice with its line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub patient_id: PatientId,
    /// Clinical event the invoice settles, absent for manual invoices
    pub source: Option<BillingSource>,
    /// Sum of item amounts, fixed at creation
    pub total_amount: Money,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    /// Sum of the item amounts
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| &item.amount).sum()
    }
}

/// A single charge on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub description: String,
    pub amount: Money,
}

/// Line item input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub description: String,
    pub amount: Money,
}

impl NewInvoiceItem {
    pub fn new(description: impl Into<String>, amount: Money) -> Self {
        Self {
            description: description.into(),
            amount,
        }
    }
}

/// Unvalidated invoice input
///
/// Drafts never carry a source event; only settlement links an invoice to
/// the appointment or lab request it pays for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub patient_id: Option<PatientId>,
    pub items: Vec<NewInvoiceItem>,
}

impl InvoiceDraft {
    /// Starts a draft for a patient
    pub fn for_patient(patient_id: PatientId) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Default::default()
        }
    }

    /// Adds a line item
    pub fn with_item(mut self, description: impl Into<String>, amount: Money) -> Self {
        self.items.push(NewInvoiceItem::new(description, amount));
        self
    }
}

/// Validated invoice, ready to be persisted
///
/// Only obtainable through `try_new`, so the total always equals the sum of
/// the items.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    patient_id: PatientId,
    items: Vec<NewInvoiceItem>,
    source: Option<BillingSource>,
    total_amount: Money,
}

impl NewInvoice {
    /// Validates a draft
    ///
    /// # Errors
    ///
    /// `InvalidInvoiceData` if the patient is missing, there are no items, an
    /// item has an empty description or a negative amount, or the total does
    /// not fit the ledger.
    pub fn try_new(draft: InvoiceDraft) -> Result<Self, BillingError> {
        let patient_id = draft
            .patient_id
            .ok_or_else(|| BillingError::InvalidInvoiceData("patient is required".into()))?;

        if draft.items.is_empty() {
            return Err(BillingError::InvalidInvoiceData(
                "an invoice needs at least one item".into(),
            ));
        }

        for (index, item) in draft.items.iter().enumerate() {
            if item.description.trim().is_empty() {
                return Err(BillingError::InvalidInvoiceData(format!(
                    "item {} has an empty description",
                    index
                )));
            }
            if item.amount.is_negative() {
                return Err(BillingError::InvalidInvoiceData(format!(
                    "item {} has a negative amount {}",
                    index, item.amount
                )));
            }
        }

        let total_amount = Money::checked_sum(draft.items.iter().map(|item| &item.amount))
            .and_then(Money::within_ledger_range)
            .map_err(|e| BillingError::InvalidInvoiceData(e.to_string()))?;

        Ok(Self {
            patient_id,
            items: draft.items,
            source: None,
            total_amount,
        })
    }

    /// Links the invoice to the clinical event being settled
    pub(crate) fn settling(mut self, source: BillingSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn items(&self) -> &[NewInvoiceItem] {
        &self.items
    }

    pub fn source(&self) -> Option<BillingSource> {
        self.source
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }
}

/// Filter for listing invoices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceQuery {
    pub patient_id: Option<PatientId>,
    pub is_paid: Option<bool>,
}

impl InvoiceQuery {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.patient_id.map_or(true, |p| invoice.patient_id == p)
            && self.is_paid.map_or(true, |paid| invoice.is_paid == paid)
    }
}

/// An invoice together with its payment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
    pub amount_paid: Money,
    pub balance_due: Money,
}

impl InvoiceDetails {
    /// Derives paid and due amounts from the payment history
    pub fn new(invoice: Invoice, payments: Vec<Payment>) -> Self {
        let amount_paid: Money = payments.iter().map(|p| &p.amount).sum();
        let balance_due = (invoice.total_amount - amount_paid).clamp_non_negative();
        Self {
            invoice,
            payments,
            amount_paid,
            balance_due,
        }
    }
}

/// Invoice ledger operations
pub struct InvoiceLedger;

impl InvoiceLedger {
    /// Creates a manual invoice with its items inside the given unit of work
    ///
    /// The invoice starts unpaid and is not linked to any clinical event.
    ///
    /// # Errors
    ///
    /// `InvalidInvoiceData` for a malformed draft
    pub async fn create_invoice(
        tx: &mut dyn BillingTx,
        draft: InvoiceDraft,
    ) -> Result<Invoice, BillingError> {
        Self::insert(tx, NewInvoice::try_new(draft)?).await
    }

    /// Creates the invoice for a clinical event being settled
    ///
    /// `AlreadyPaid` if the event already has an invoice.
    pub(crate) async fn create_for_source(
        tx: &mut dyn BillingTx,
        draft: InvoiceDraft,
        source: BillingSource,
    ) -> Result<Invoice, BillingError> {
        Self::insert(tx, NewInvoice::try_new(draft)?.settling(source)).await
    }

    async fn insert(tx: &mut dyn BillingTx, new: NewInvoice) -> Result<Invoice, BillingError> {
        let invoice = tx.insert_invoice(&new).await.map_err(|err| match new.source() {
            Some(source) if err.is_conflict() => {
                warn!(source = %source, "source event already invoiced");
                BillingError::already_paid(source.entity(), source)
            }
            _ => BillingError::from(err),
        })?;

        info!(
            invoice_id = %invoice.id,
            patient_id = %invoice.patient_id,
            total = %invoice.total_amount,
            "invoice created"
        );
        Ok(invoice)
    }

    /// Loads a committed invoice
    pub async fn get_invoice(
        store: &dyn BillingStore,
        id: InvoiceId,
    ) -> Result<Invoice, BillingError> {
        store
            .get_invoice(id)
            .await?
            .ok_or_else(|| BillingError::not_found("Invoice", id))
    }

    /// Loads a committed invoice with its payments
    pub async fn invoice_details(
        store: &dyn BillingStore,
        id: InvoiceId,
    ) -> Result<InvoiceDetails, BillingError> {
        let invoice = Self::get_invoice(store, id).await?;
        let payments = store.list_payments(&PaymentQuery::for_invoice(id)).await?;
        Ok(InvoiceDetails::new(invoice, payments))
    }

    /// Lists committed invoices, newest first
    pub async fn list_invoices(
        store: &dyn BillingStore,
        query: &InvoiceQuery,
    ) -> Result<Vec<Invoice>, BillingError> {
        Ok(store.list_invoices(query).await?)
    }
}
