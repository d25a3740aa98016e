//! Repository implementations for the billing ledger
//!
//! Repositories encapsulate SQL queries and row types. Reads outside a unit
//! of work run on the pool; everything a settlement decides on runs on the
//! connection of the open transaction.

pub mod billing;

pub use billing::{
    BillingRepository, AppointmentRow, LabRequestRow, PriceRow,
    InvoiceRow, InvoiceItemRow, PaymentRow, NewPriceRow, PaymentFilter,
};
