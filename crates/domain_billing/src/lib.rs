//! Billing Domain - Settlement of Clinical Events
//!
//! This crate turns unpaid clinical events (appointments and lab requests)
//! into paid invoices with itemized charges and reconciled payments.
//!
//! # Components
//!
//! - **Price Catalog** (`catalog`): billable item definitions, read-only to settlement
//! - **Invoice Ledger** (`invoice`): invoices and their line items
//! - **Payment Recorder** (`payment`): append-only payments, the only place an
//!   invoice's paid state is computed
//! - **Settlement Orchestrator** (`settlement`): validates, prices, flips the
//!   event's paid flag, invoices and records the full payment in one unit of work
//! - **Financial Reporting** (`reporting`): read-only aggregation for dashboards
//!
//! # Ledger invariants
//!
//! - `sum(items.amount) == invoice.total_amount`
//! - `sum(payments.amount) <= invoice.total_amount`
//! - `invoice.is_paid <=> sum(payments.amount) >= invoice.total_amount`
//! - an event flips from unpaid to paid at most once and is invoiced at most once
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_billing::{BillingService, InMemoryBillingStore};
//!
//! let service = BillingService::new(Arc::new(InMemoryBillingStore::new()));
//! let settlement = service.settle_appointment(appointment_id, cashier_id).await?;
//! assert!(settlement.invoice.is_paid);
//! ```

pub mod adapters;
pub mod catalog;
pub mod clinical;
pub mod error;
pub mod invoice;
pub mod payment;
pub mod ports;
pub mod reporting;
pub mod service;
pub mod settlement;

pub use adapters::{InMemoryBillingStore, FailPoint};
pub use catalog::{PriceListing, PriceType, NewPriceListing, PriceUpdate, PriceQuery};
pub use clinical::{Appointment, LabRequest, BillingSource};
pub use error::{BillingError, BillingErrorKind};
pub use invoice::{Invoice, InvoiceItem, InvoiceDraft, NewInvoice, NewInvoiceItem, InvoiceQuery, InvoiceDetails, InvoiceLedger};
pub use payment::{Payment, NewPayment, PaymentQuery, PaymentReceipt, PaymentRecorder};
pub use ports::{BillingStore, BillingTx};
pub use reporting::{DateRange, FinancialSummary, DailyRevenue, CashierTotal};
pub use service::BillingService;
pub use settlement::{
    Settlement, SettlementTarget, SettlementOrchestrator,
    AppointmentTarget, LabRequestTarget,
};
