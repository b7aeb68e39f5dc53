use chrono::{DateTime, SecondsFormat, Utc};
use gpuaudit_application::{AuditFilter, AuditScan, RawAuditEvent, ScanOrder, TimeRange};
use gpuaudit_core::AppError;
use gpuaudit_domain::{AuditRecord, AuditRecordSummary, RecentAuditRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Incoming audit event. Every field is optional on the wire and validated by ingestion.
#[derive(Debug, Default, Deserialize, TS)]
#[serde(default)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/submit-audit-event-request.ts"
)]
pub struct SubmitAuditEventRequest {
    pub event_type: Option<String>,
    pub model_name: Option<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
    #[ts(type = "number | null")]
    pub duration_ms: Option<i64>,
    pub inference_id: Option<String>,
    #[ts(type = "unknown")]
    pub input: Option<Value>,
    #[ts(type = "unknown")]
    pub output: Option<Value>,
    #[ts(type = "Record<string, unknown> | null")]
    pub payload: Option<Value>,
}

impl From<SubmitAuditEventRequest> for RawAuditEvent {
    fn from(value: SubmitAuditEventRequest) -> Self {
        Self {
            event_type: value.event_type,
            model_name: value.model_name,
            status: value.status,
            user_id: value.user_id,
            duration_ms: value.duration_ms,
            inference_id: value.inference_id,
            input: value.input,
            output: value.output,
            payload: value.payload,
        }
    }
}

/// Identifier of an accepted audit event.
#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/submit-audit-event-response.ts"
)]
pub struct SubmitAuditEventResponse {
    pub log_id: String,
}

/// API representation of a stored audit record.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-record-response.ts"
)]
pub struct AuditRecordResponse {
    pub log_id: String,
    pub timestamp: String,
    pub event_type: String,
    pub user_id: Option<String>,
    pub model_name: String,
    pub status: String,
    #[ts(type = "number")]
    pub duration_ms: u64,
    pub inference_id: Option<String>,
    pub input_hash: Option<String>,
    pub output_hash: Option<String>,
    pub pii_redacted: bool,
    #[ts(type = "Record<string, unknown>")]
    pub payload: Value,
}

impl From<AuditRecord> for AuditRecordResponse {
    fn from(value: AuditRecord) -> Self {
        Self {
            log_id: value.log_id().to_string(),
            timestamp: format_timestamp(value.timestamp()),
            event_type: value.event_type().as_str().to_owned(),
            user_id: value.user_id().map(|user_id| user_id.as_str().to_owned()),
            model_name: value.model_name().as_str().to_owned(),
            status: value.status().as_str().to_owned(),
            duration_ms: value.duration_ms(),
            inference_id: value.inference_id().map(ToOwned::to_owned),
            input_hash: value.input_hash().map(ToOwned::to_owned),
            output_hash: value.output_hash().map(ToOwned::to_owned),
            pii_redacted: value.pii_redacted(),
            payload: value.payload().clone(),
        }
    }
}

/// API representation of a record in the recent-activity view.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/recent-audit-record-response.ts"
)]
pub struct RecentAuditRecordResponse {
    pub log_id: String,
    pub timestamp: String,
    pub event_type: String,
    pub user_id: Option<String>,
    pub model_name: String,
    pub status: String,
    #[ts(type = "number")]
    pub duration_ms: u64,
    pub pii_redacted: bool,
}

impl From<RecentAuditRecord> for RecentAuditRecordResponse {
    fn from(value: RecentAuditRecord) -> Self {
        Self {
            log_id: value.log_id.to_string(),
            timestamp: format_timestamp(value.timestamp),
            event_type: value.event_type.as_str().to_owned(),
            user_id: value.user_id.map(String::from),
            model_name: value.model_name.into(),
            status: value.status.as_str().to_owned(),
            duration_ms: value.duration_ms,
            pii_redacted: value.pii_redacted,
        }
    }
}

/// API representation of a per-user audit summary.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-record-summary-response.ts"
)]
pub struct AuditRecordSummaryResponse {
    pub log_id: String,
    pub timestamp: String,
    pub event_type: String,
    pub model_name: String,
    pub status: String,
}

impl From<AuditRecordSummary> for AuditRecordSummaryResponse {
    fn from(value: AuditRecordSummary) -> Self {
        Self {
            log_id: value.log_id.to_string(),
            timestamp: format_timestamp(value.timestamp),
            event_type: value.event_type.as_str().to_owned(),
            model_name: value.model_name.into(),
            status: value.status.as_str().to_owned(),
        }
    }
}

/// Query string of the recent-activity view.
#[derive(Debug, Default, Deserialize)]
pub struct RecentAuditQuery {
    pub window_hours: Option<String>,
}

/// Query string of filtered audit searches.
#[derive(Debug, Default, Deserialize)]
pub struct AuditEventSearchQuery {
    pub event_type: Option<String>,
    pub model_name: Option<String>,
    pub status: Option<String>,
    pub pii_redacted: Option<bool>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub order: Option<String>,
    pub limit: Option<usize>,
}

impl TryFrom<AuditEventSearchQuery> for AuditScan {
    type Error = AppError;

    fn try_from(value: AuditEventSearchQuery) -> Result<Self, Self::Error> {
        let order = match value.order.as_deref().map(str::trim) {
            None | Some("") | Some("desc") => ScanOrder::Descending,
            Some("asc") => ScanOrder::Ascending,
            Some(other) => {
                return Err(AppError::validation(
                    "order",
                    format!("order must be 'asc' or 'desc', got '{other}'"),
                ));
            }
        };

        Ok(Self {
            filter: AuditFilter {
                event_type: non_blank(value.event_type)
                    .map(|event_type| event_type.parse())
                    .transpose()?,
                model_name: non_blank(value.model_name),
                status: non_blank(value.status)
                    .map(|status| status.parse())
                    .transpose()?,
                pii_redacted: value.pii_redacted,
                user_id: None,
            },
            time_range: TimeRange {
                from: parse_timestamp("from", value.from)?,
                to: parse_timestamp("to", value.to)?,
            },
            order,
            limit: value.limit,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_timestamp(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    non_blank(value)
        .map(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .map_err(|error| {
                    AppError::validation(field, format!("expected an RFC 3339 timestamp: {error}"))
                })
        })
        .transpose()
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
