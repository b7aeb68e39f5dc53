mod audit;

use serde::Serialize;
use ts_rs::TS;

pub use audit::{
    AuditEventSearchQuery, AuditRecordResponse, AuditRecordSummaryResponse, RecentAuditQuery,
    RecentAuditRecordResponse, SubmitAuditEventRequest, SubmitAuditEventResponse,
};

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub detail: Option<String>,
}
