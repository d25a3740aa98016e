//! Payment Recorder
//!
//! Payments are append-only. Recording a payment is the only place an
//! invoice's paid flag is recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{InvoiceId, Money, PaymentId, UserId};

use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::ports::BillingTx;
use crate::reporting::DateRange;

/// A recorded payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    /// Acting cashier; weak reference, may be cleared if the user is removed
    pub cashier_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Payment input handed to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub cashier_id: Option<UserId>,
}

/// Filter for listing payments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentQuery {
    pub invoice_id: Option<InvoiceId>,
    pub cashier_id: Option<UserId>,
    pub range: DateRange,
}

impl PaymentQuery {
    pub fn for_invoice(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id: Some(invoice_id),
            ..Default::default()
        }
    }

    pub fn in_range(range: DateRange) -> Self {
        Self {
            range,
            ..Default::default()
        }
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        self.invoice_id.map_or(true, |id| payment.invoice_id == id)
            && self.cashier_id.map_or(true, |c| payment.cashier_id == Some(c))
            && self.range.contains(payment.created_at)
    }
}

/// Result of recording a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    /// The invoice with its recomputed paid flag
    pub invoice: Invoice,
}

/// Payment recorder operations
pub struct PaymentRecorder;

impl PaymentRecorder {
    /// Records a payment against an invoice inside the given unit of work
    ///
    /// The invoice row is locked before the running total is read, so two
    /// concurrent payments cannot both pass the due check.
    ///
    /// # Arguments
    ///
    /// * `tx` - Unit of work the payment joins
    /// * `invoice_id` - Invoice being paid
    /// * `amount` - Positive payment amount
    /// * `cashier_id` - Acting cashier, if known
    ///
    /// # Errors
    ///
    /// - `InvalidPaymentData` if the amount is not positive or not storable
    /// - `NotFound` if the invoice does not exist
    /// - `PaymentExceedsDue` if the paid total would exceed the invoice total
    pub async fn add_payment(
        tx: &mut dyn BillingTx,
        invoice_id: InvoiceId,
        amount: Money,
        cashier_id: Option<UserId>,
    ) -> Result<PaymentReceipt, BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::InvalidPaymentData(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        amount
            .within_ledger_range()
            .map_err(|e| BillingError::InvalidPaymentData(e.to_string()))?;

        let mut invoice = tx
            .lock_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Invoice", invoice_id))?;

        let already_paid = tx.payments_total(invoice_id).await?;
        let total_paid = already_paid
            .checked_add(&amount)
            .map_err(|e| BillingError::InvalidPaymentData(e.to_string()))?;

        if total_paid > invoice.total_amount {
            warn!(
                invoice_id = %invoice_id,
                total = %invoice.total_amount,
                paid = %already_paid,
                attempted = %amount,
                "payment exceeds amount due"
            );
            return Err(BillingError::PaymentExceedsDue {
                invoice_id,
                balance_due: (invoice.total_amount - already_paid).clamp_non_negative(),
                attempted: amount,
            });
        }

        let payment = tx
            .insert_payment(&NewPayment {
                invoice_id,
                amount,
                cashier_id,
            })
            .await?;

        let is_paid = total_paid >= invoice.total_amount;
        tx.set_invoice_paid(invoice_id, is_paid).await?;
        invoice.is_paid = is_paid;

        info!(
            invoice_id = %invoice_id,
            payment_id = %payment.id,
            amount = %amount,
            is_paid,
            "payment recorded"
        );
        Ok(PaymentReceipt { payment, invoice })
    }
}
