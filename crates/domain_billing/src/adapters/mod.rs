//! Storage adapters bundled with the domain
//!
//! The PostgreSQL adapter lives in `infra_db`; the in-memory adapter here
//! backs unit tests and the demo mode of the API server.

pub mod memory;

pub use memory::{FailPoint, InMemoryBillingStore};
