//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_ingestion_service;
mod audit_ports;
mod audit_query_service;
mod deadline;
mod redaction;

#[cfg(test)]
mod test_support;

pub use audit_ingestion_service::{AuditIngestionService, RawAuditEvent};
pub use audit_ports::{AuditFilter, AuditScan, AuditStore, Clock, ScanOrder, TimeRange};
pub use audit_query_service::{
    AuditQueryService, DEFAULT_RECENT_WINDOW, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};
pub use deadline::within_deadline;
pub use redaction::{
    CoverageGap, CoverageGapReason, PiiDetectorKind, REDACTION_PLACEHOLDER, RedactionOutcome,
    RedactionPolicy, Redactor, content_digest,
};
