use std::str::FromStr;

use chrono::{DateTime, Utc};
use gpuaudit_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::identity::UserIdHash;

/// Globally unique audit record identifier, assigned at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(Uuid);

impl LogId {
    /// Creates a random log identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a log identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LogId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for LogId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::validation("log_id", format!("invalid log id: {error}")))
    }
}

/// Category of an audited inference event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A caller submitted an inference request.
    InferenceRequest,
    /// A model produced an inference response.
    InferenceResponse,
    /// An inference failed while executing.
    InferenceError,
    /// A model was loaded onto a GPU.
    ModelLoad,
    /// A model was evicted from a GPU.
    ModelUnload,
    /// A principal authenticated against the inference service.
    UserAuthentication,
    /// A principal was refused access.
    AccessDenied,
    /// GPU capacity was reserved for a workload.
    GpuAllocation,
    /// GPU capacity was returned to the pool.
    GpuRelease,
    /// A request violated a content or usage policy.
    PolicyViolation,
}

impl AuditEventType {
    /// Returns a stable storage value for this event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InferenceRequest => "inference_request",
            Self::InferenceResponse => "inference_response",
            Self::InferenceError => "inference_error",
            Self::ModelLoad => "model_load",
            Self::ModelUnload => "model_unload",
            Self::UserAuthentication => "user_authentication",
            Self::AccessDenied => "access_denied",
            Self::GpuAllocation => "gpu_allocation",
            Self::GpuRelease => "gpu_release",
            Self::PolicyViolation => "policy_violation",
        }
    }

    /// Returns all known event types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditEventType] = &[
            AuditEventType::InferenceRequest,
            AuditEventType::InferenceResponse,
            AuditEventType::InferenceError,
            AuditEventType::ModelLoad,
            AuditEventType::ModelUnload,
            AuditEventType::UserAuthentication,
            AuditEventType::AccessDenied,
            AuditEventType::GpuAllocation,
            AuditEventType::GpuRelease,
            AuditEventType::PolicyViolation,
        ];

        ALL
    }
}

impl FromStr for AuditEventType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == value)
            .ok_or_else(|| {
                AppError::validation("event_type", format!("unknown event type '{value}'"))
            })
    }
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Operation completed.
    Success,
    /// Operation failed.
    Error,
    /// Operation was refused by policy.
    Blocked,
}

impl AuditStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Blocked => "blocked",
        }
    }

    /// Returns all known statuses.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Success, Self::Error, Self::Blocked]
    }
}

impl FromStr for AuditStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "blocked" => Ok(Self::Blocked),
            _ => Err(AppError::validation(
                "status",
                format!("unknown status '{value}'"),
            )),
        }
    }
}

/// Redacted audit record that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    /// Event category.
    pub event_type: AuditEventType,
    /// Hashed requesting principal.
    pub user_id: Option<UserIdHash>,
    /// Model that served the request.
    pub model_name: NonEmptyString,
    /// Operation outcome.
    pub status: AuditStatus,
    /// Latency of the audited operation.
    pub duration_ms: u64,
    /// Correlation identifier of the inference call.
    pub inference_id: Option<String>,
    /// SHA-256 of the canonical model input.
    pub input_hash: Option<String>,
    /// SHA-256 of the canonical model output.
    pub output_hash: Option<String>,
    /// Whether redaction altered the payload or identifier.
    pub pii_redacted: bool,
    /// Post-redaction event body. Always a JSON object.
    pub payload: Value,
}

impl NewAuditRecord {
    /// Creates a record with the required fields and an empty payload.
    #[must_use]
    pub fn new(event_type: AuditEventType, model_name: NonEmptyString, status: AuditStatus) -> Self {
        Self {
            event_type,
            user_id: None,
            model_name,
            status,
            duration_ms: 0,
            inference_id: None,
            input_hash: None,
            output_hash: None,
            pii_redacted: false,
            payload: Value::Object(Map::new()),
        }
    }

    /// Checks invariants a store must enforce before accepting the record.
    pub fn validate(&self) -> AppResult<()> {
        if i64::try_from(self.duration_ms).is_err() {
            return Err(AppError::validation(
                "duration_ms",
                format!("duration must not exceed {}", i64::MAX),
            ));
        }

        if !self.payload.is_object() {
            return Err(AppError::validation(
                "payload",
                "payload must be a JSON object",
            ));
        }

        if self
            .inference_id
            .as_deref()
            .is_some_and(|value| value.trim().is_empty())
        {
            return Err(AppError::validation(
                "inference_id",
                "inference id must not be blank when present",
            ));
        }

        for (field, digest) in [
            ("input_hash", self.input_hash.as_deref()),
            ("output_hash", self.output_hash.as_deref()),
        ] {
            if digest.is_some_and(|value| !is_sha256_hex(value)) {
                return Err(AppError::validation(
                    field,
                    "digest must be 64 lowercase hex characters",
                ));
            }
        }

        Ok(())
    }
}

/// Immutable persisted audit record.
///
/// Fields are only readable: records are created once by a store and never
/// updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    log_id: LogId,
    timestamp: DateTime<Utc>,
    event_type: AuditEventType,
    user_id: Option<UserIdHash>,
    model_name: NonEmptyString,
    status: AuditStatus,
    duration_ms: u64,
    #[serde(default)]
    inference_id: Option<String>,
    #[serde(default)]
    input_hash: Option<String>,
    #[serde(default)]
    output_hash: Option<String>,
    pii_redacted: bool,
    payload: Value,
}

impl AuditRecord {
    /// Seals a new record with its store-assigned identity and timestamp.
    #[must_use]
    pub fn seal(log_id: LogId, timestamp: DateTime<Utc>, record: NewAuditRecord) -> Self {
        Self {
            log_id,
            timestamp,
            event_type: record.event_type,
            user_id: record.user_id,
            model_name: record.model_name,
            status: record.status,
            duration_ms: record.duration_ms,
            inference_id: record.inference_id,
            input_hash: record.input_hash,
            output_hash: record.output_hash,
            pii_redacted: record.pii_redacted,
            payload: record.payload,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn log_id(&self) -> LogId {
        self.log_id
    }

    /// Returns the store-assigned creation time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the event category.
    #[must_use]
    pub fn event_type(&self) -> AuditEventType {
        self.event_type
    }

    /// Returns the hashed principal, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserIdHash> {
        self.user_id.as_ref()
    }

    /// Returns the model name.
    #[must_use]
    pub fn model_name(&self) -> &NonEmptyString {
        &self.model_name
    }

    /// Returns the operation outcome.
    #[must_use]
    pub fn status(&self) -> AuditStatus {
        self.status
    }

    /// Returns the operation latency in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Returns the inference correlation identifier.
    #[must_use]
    pub fn inference_id(&self) -> Option<&str> {
        self.inference_id.as_deref()
    }

    /// Returns the model input digest.
    #[must_use]
    pub fn input_hash(&self) -> Option<&str> {
        self.input_hash.as_deref()
    }

    /// Returns the model output digest.
    #[must_use]
    pub fn output_hash(&self) -> Option<&str> {
        self.output_hash.as_deref()
    }

    /// Returns whether redaction altered this record.
    #[must_use]
    pub fn pii_redacted(&self) -> bool {
        self.pii_redacted
    }

    /// Returns the post-redaction payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the `(timestamp, log_id)` ordering key.
    #[must_use]
    pub fn sort_key(&self) -> (DateTime<Utc>, LogId) {
        (self.timestamp, self.log_id)
    }

    /// Projects the record onto the per-user lookup field set.
    #[must_use]
    pub fn summary(&self) -> AuditRecordSummary {
        AuditRecordSummary {
            log_id: self.log_id,
            timestamp: self.timestamp,
            event_type: self.event_type,
            model_name: self.model_name.clone(),
            status: self.status,
        }
    }

    /// Projects the record onto the recent-activity field set.
    #[must_use]
    pub fn recent_view(&self) -> RecentAuditRecord {
        RecentAuditRecord {
            log_id: self.log_id,
            timestamp: self.timestamp,
            event_type: self.event_type,
            user_id: self.user_id.clone(),
            model_name: self.model_name.clone(),
            status: self.status,
            duration_ms: self.duration_ms,
            pii_redacted: self.pii_redacted,
        }
    }
}

/// Reduced projection returned by per-user lookups. Carries no payload and no identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecordSummary {
    /// Record identifier.
    pub log_id: LogId,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Event category.
    pub event_type: AuditEventType,
    /// Model name.
    pub model_name: NonEmptyString,
    /// Operation outcome.
    pub status: AuditStatus,
}

/// Projection served by the rolling recent-activity view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAuditRecord {
    /// Record identifier.
    pub log_id: LogId,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Event category.
    pub event_type: AuditEventType,
    /// Hashed principal.
    pub user_id: Option<UserIdHash>,
    /// Model name.
    pub model_name: NonEmptyString,
    /// Operation outcome.
    pub status: AuditStatus,
    /// Operation latency.
    pub duration_ms: u64,
    /// Whether redaction altered the record.
    pub pii_redacted: bool,
}

pub(crate) fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64
        && value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}
