//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod identity;

pub use audit::{
    AuditEventType, AuditRecord, AuditRecordSummary, AuditStatus, LogId, NewAuditRecord,
    RecentAuditRecord,
};
pub use identity::UserIdHash;
