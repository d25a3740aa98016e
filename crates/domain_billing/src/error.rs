//! Billing domain errors

use thiserror::Error;
use tracing::error;

use core_kernel::{InvoiceId, Money, PortError};

use crate::catalog::PriceType;

/// Errors that can occur in the billing domain
///
/// Every failure that leaves the settlement boundary is one of these
/// variants; the HTTP layer maps `kind()` to a transport status.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Referenced clinical event, invoice or price does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// The event has already been settled
    #[error("{entity} {id} is already paid")]
    AlreadyPaid {
        entity: String,
        id: String,
    },

    /// The catalog has no usable price for the event
    #[error("No active {price_type} price is configured: {detail}")]
    PricingNotConfigured {
        price_type: PriceType,
        detail: String,
    },

    /// Malformed invoice input
    #[error("Invalid invoice data: {0}")]
    InvalidInvoiceData(String),

    /// Malformed payment input
    #[error("Invalid payment data: {0}")]
    InvalidPaymentData(String),

    /// Malformed or conflicting catalog input
    #[error("Invalid price data: {0}")]
    InvalidPriceData(String),

    /// Payment would push the paid total above the invoice total
    #[error("Payment of {attempted} exceeds the {balance_due} due on {invoice_id}")]
    PaymentExceedsDue {
        invoice_id: InvoiceId,
        balance_due: Money,
        attempted: Money,
    },

    /// Storage or transaction failure
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

/// Stable, machine-readable classification of a `BillingError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BillingErrorKind {
    NotFound,
    AlreadyPaid,
    PricingNotConfigured,
    InvalidInvoiceData,
    InvalidPaymentData,
    InvalidPriceData,
    PaymentExceedsDue,
    PersistenceFailure,
}

impl BillingErrorKind {
    /// Returns the wire tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingErrorKind::NotFound => "not_found",
            BillingErrorKind::AlreadyPaid => "already_paid",
            BillingErrorKind::PricingNotConfigured => "pricing_not_configured",
            BillingErrorKind::InvalidInvoiceData => "invalid_invoice_data",
            BillingErrorKind::InvalidPaymentData => "invalid_payment_data",
            BillingErrorKind::InvalidPriceData => "invalid_price_data",
            BillingErrorKind::PaymentExceedsDue => "payment_exceeds_due",
            BillingErrorKind::PersistenceFailure => "persistence_failure",
        }
    }
}

impl std::fmt::Display for BillingErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BillingError {
    /// Creates a not found error for an entity type and identifier
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        BillingError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Creates an already-paid rejection for an entity type and identifier
    pub fn already_paid(entity: &str, id: impl std::fmt::Display) -> Self {
        BillingError::AlreadyPaid {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns the stable classification of this error
    pub fn kind(&self) -> BillingErrorKind {
        match self {
            BillingError::NotFound { .. } => BillingErrorKind::NotFound,
            BillingError::AlreadyPaid { .. } => BillingErrorKind::AlreadyPaid,
            BillingError::PricingNotConfigured { .. } => BillingErrorKind::PricingNotConfigured,
            BillingError::InvalidInvoiceData(_) => BillingErrorKind::InvalidInvoiceData,
            BillingError::InvalidPaymentData(_) => BillingErrorKind::InvalidPaymentData,
            BillingError::InvalidPriceData(_) => BillingErrorKind::InvalidPriceData,
            BillingError::PaymentExceedsDue { .. } => BillingErrorKind::PaymentExceedsDue,
            BillingError::PersistenceFailure(_) => BillingErrorKind::PersistenceFailure,
        }
    }

    /// True for failures operators must fix (catalog data, storage), as
    /// opposed to rejections of the caller's request
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            BillingError::PricingNotConfigured { .. } | BillingError::PersistenceFailure(_)
        )
    }
}

impl From<PortError> for BillingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => BillingError::NotFound {
                entity: entity_type,
                id,
            },
            other => {
                error!(error = %other, "storage operation failed");
                BillingError::PersistenceFailure(other.to_string())
            }
        }
    }
}
