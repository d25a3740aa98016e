//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL storage for the clinic billing ledger,
//! implemented on SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` holds the SQL and
//! row types, `adapters` implements the domain's `BillingStore` port on top
//! of them and translates rows into domain types.
//!
//! # Concurrency
//!
//! Settlement consistency rests on three database mechanisms:
//! - `SELECT ... FOR UPDATE` on the event and invoice rows inside the unit
//! - conditional `UPDATE ... WHERE is_paid = FALSE` when flipping paid flags
//! - a unique index on `invoices (source_type, source_id)`
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/clinic")).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, DatabaseConfig};
pub use error::DatabaseError;
pub use repositories::BillingRepository;
pub use adapters::PostgresBillingStore;
