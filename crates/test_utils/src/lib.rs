//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! clinic billing test suite.
//!
//! # Modules
//!
//! - `fixtures`: The canonical clinic scenario, in memory and in PostgreSQL
//! - `builders`: Builder patterns for clinical events and price listings
//! - `database`: Database test helpers and container management
//! - `assertions`: Ledger consistency checks
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
