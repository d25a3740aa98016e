//! Core Kernel - Foundational types and utilities for the clinic billing system
//!
//! This crate provides the fundamental building blocks used across the workspace:
//! - Money type with exact decimal arithmetic
//! - Strongly-typed identifiers for patients, events, and ledger records
//! - Port traits and errors for the ports-and-adapters layout

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, MoneyError};
pub use identifiers::{
    PatientId, DoctorId, UserId, AppointmentId, LabRequestId,
    PriceId, InvoiceId, InvoiceItemId, PaymentId,
};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
