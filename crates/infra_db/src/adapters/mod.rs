//! Domain Adapters
//!
//! Implements the billing domain's storage port on PostgreSQL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_billing::BillingService;
//! use infra_db::adapters::PostgresBillingStore;
//!
//! let service = BillingService::new(Arc::new(PostgresBillingStore::new(pool)));
//! ```

pub mod billing;

pub use billing::PostgresBillingStore;
