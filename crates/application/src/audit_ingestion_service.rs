use std::sync::Arc;
use std::time::Duration;

use gpuaudit_core::{AppError, AppResult, NonEmptyString};
use gpuaudit_domain::{AuditEventType, AuditStatus, LogId, NewAuditRecord};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::deadline::within_deadline;
use crate::redaction::{Redactor, content_digest};
use crate::AuditStore;

/// Unvalidated event as submitted by an ingestion agent.
///
/// Every field is optional at this layer; `submit` decides what is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAuditEvent {
    /// Event category storage value.
    pub event_type: Option<String>,
    /// Model name.
    pub model_name: Option<String>,
    /// Outcome storage value.
    pub status: Option<String>,
    /// Raw principal identifier. Never persisted as submitted.
    pub user_id: Option<String>,
    /// Operation latency.
    pub duration_ms: Option<i64>,
    /// Inference correlation identifier.
    pub inference_id: Option<String>,
    /// Model input. Only its digest is persisted.
    pub input: Option<Value>,
    /// Model output. Only its digest is persisted.
    pub output: Option<Value>,
    /// Free-form event body, redacted before storage.
    pub payload: Option<Value>,
}

/// Application service owning the single audit write path.
#[derive(Clone)]
pub struct AuditIngestionService {
    store: Arc<dyn AuditStore>,
    redactor: Arc<Redactor>,
}

impl AuditIngestionService {
    /// Creates a service from a store and redactor.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, redactor: Arc<Redactor>) -> Self {
        Self { store, redactor }
    }

    /// Validates, redacts and appends one event.
    ///
    /// The append is bounded by `timeout` and never retried here: a caller
    /// that receives `StoreUnavailable` or `TimeoutExceeded` decides whether
    /// to resubmit.
    pub async fn submit(&self, event: RawAuditEvent, timeout: Duration) -> AppResult<LogId> {
        let record = self.prepare(event)?;
        let event_type = record.event_type;
        let pii_redacted = record.pii_redacted;
        let model_name = record.model_name.clone();

        match within_deadline("append", timeout, self.store.append(record)).await {
            Ok(log_id) => {
                info!(
                    %log_id,
                    event_type = event_type.as_str(),
                    model_name = %model_name,
                    pii_redacted,
                    "audit event recorded"
                );
                Ok(log_id)
            }
            Err(error) => {
                warn!(
                    error_kind = error.kind(),
                    event_type = event_type.as_str(),
                    model_name = %model_name,
                    error = %error,
                    "failed to record audit event"
                );
                Err(error)
            }
        }
    }

    fn prepare(&self, event: RawAuditEvent) -> AppResult<NewAuditRecord> {
        let RawAuditEvent {
            event_type,
            model_name,
            status,
            user_id,
            duration_ms,
            inference_id,
            input,
            output,
            payload,
        } = event;

        let event_type = present(event_type);
        let model_name = present(model_name);
        let status = present(status);

        let missing: Vec<&str> = [
            ("event_type", event_type.is_none()),
            ("model_name", model_name.is_none()),
            ("status", status.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, is_missing)| is_missing.then_some(field))
        .collect();
        if let Some(first_missing) = missing.first() {
            return Err(AppError::validation(
                *first_missing,
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        let event_type: AuditEventType = event_type.unwrap_or_default().parse()?;
        let status: AuditStatus = status.unwrap_or_default().parse()?;
        let model_name = NonEmptyString::new("model_name", model_name.unwrap_or_default())?;

        let duration_ms = match duration_ms {
            None => 0,
            Some(value) => u64::try_from(value).map_err(|_| {
                AppError::validation("duration_ms", "duration must not be negative")
            })?,
        };

        let payload = match payload {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value @ Value::Object(_)) => value,
            Some(_) => {
                return Err(AppError::validation(
                    "payload",
                    "payload must be a JSON object",
                ));
            }
        };

        let outcome = self.redactor.redact(payload, user_id.as_deref());
        if outcome.was_redacted {
            debug!(
                redacted_fields = outcome.redacted_paths.len(),
                coverage_gaps = outcome.coverage_gaps.len(),
                "audit payload redacted"
            );
        }

        let record = NewAuditRecord {
            event_type,
            user_id: outcome.user_id,
            model_name,
            status,
            duration_ms,
            inference_id: present(inference_id),
            input_hash: input.filter(|value| !value.is_null()).as_ref().map(content_digest),
            output_hash: output
                .filter(|value| !value.is_null())
                .as_ref()
                .map(content_digest),
            pii_redacted: outcome.was_redacted,
            payload: outcome.payload,
        };
        record.validate()?;

        Ok(record)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests;
