//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod audit_index;
mod clock;
mod in_memory_audit_store;
mod journaled_audit_store;
mod postgres_audit_store;

pub use clock::{ManualClock, SystemClock};
pub use in_memory_audit_store::InMemoryAuditStore;
pub use journaled_audit_store::JournaledAuditStore;
pub use postgres_audit_store::PostgresAuditStore;
