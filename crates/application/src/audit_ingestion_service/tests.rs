use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gpuaudit_core::AppError;
use gpuaudit_domain::{AuditEventType, AuditStatus};

use crate::test_support::{FakeAuditStore, ManualClock, epoch};
use crate::{REDACTION_PLACEHOLDER, RedactionPolicy, Redactor, content_digest};

use super::{AuditIngestionService, RawAuditEvent};

const TIMEOUT: Duration = Duration::from_secs(1);

fn redactor() -> Arc<Redactor> {
    Arc::new(Redactor::new(RedactionPolicy::default()).unwrap_or_else(|_| unreachable!()))
}

fn service_with(store: Arc<FakeAuditStore>) -> AuditIngestionService {
    AuditIngestionService::new(store, redactor())
}

fn inference_event() -> RawAuditEvent {
    RawAuditEvent {
        event_type: Some("inference_request".to_owned()),
        model_name: Some("llama-3-8b".to_owned()),
        status: Some("success".to_owned()),
        ..RawAuditEvent::default()
    }
}

#[tokio::test]
async fn empty_event_is_rejected_without_storing() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let result = service.submit(RawAuditEvent::default(), TIMEOUT).await;

    match result {
        Err(AppError::Validation { field, message }) => {
            assert_eq!(field, "event_type");
            assert_eq!(
                message,
                "missing required fields: event_type, model_name, status"
            );
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn blank_model_name_counts_as_missing() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let result = service
        .submit(
            RawAuditEvent {
                model_name: Some("   ".to_owned()),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "model_name"));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn unknown_event_type_is_rejected() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let result = service
        .submit(
            RawAuditEvent {
                event_type: Some("model_training".to_owned()),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation { .. })));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn email_in_payload_is_redacted_before_storage() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let log_id = service
        .submit(
            RawAuditEvent {
                payload: Some(json!({"email": "a@b.com", "note": "hi"})),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;
    assert!(log_id.is_ok());

    let records = store.records().await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.payload()["email"], REDACTION_PLACEHOLDER);
    assert_eq!(record.payload()["note"], "hi");
    assert!(record.pii_redacted());
    assert_eq!(record.event_type(), AuditEventType::InferenceRequest);
    assert_eq!(record.status(), AuditStatus::Success);
}

#[tokio::test]
async fn user_identifier_is_stored_hashed() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let submitted = service
        .submit(
            RawAuditEvent {
                user_id: Some("alice@example.com".to_owned()),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;
    assert!(submitted.is_ok());

    let records = store.records().await;
    let user_id = records[0].user_id().map(|hash| hash.as_str().to_owned());
    assert_eq!(
        user_id,
        Some(redactor().hash_user_id("alice@example.com").as_str().to_owned())
    );
    assert!(user_id.is_some_and(|hash| !hash.contains("alice")));
    assert!(records[0].pii_redacted());
}

#[tokio::test]
async fn clean_event_is_not_flagged() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let submitted = service
        .submit(
            RawAuditEvent {
                duration_ms: Some(125),
                payload: Some(json!({"batch_size": 4})),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;
    assert!(submitted.is_ok());

    let records = store.records().await;
    assert!(!records[0].pii_redacted());
    assert_eq!(records[0].duration_ms(), 125);
    assert_eq!(records[0].payload(), &json!({"batch_size": 4}));
}

#[tokio::test]
async fn negative_duration_is_rejected() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let result = service
        .submit(
            RawAuditEvent {
                duration_ms: Some(-5),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "duration_ms"));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn non_object_payload_is_rejected() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let result = service
        .submit(
            RawAuditEvent {
                payload: Some(json!(["a@b.com"])),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation { field, .. }) if field == "payload"));
}

#[tokio::test]
async fn missing_payload_is_stored_as_empty_object() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());

    let submitted = service.submit(inference_event(), TIMEOUT).await;
    assert!(submitted.is_ok());

    let records = store.records().await;
    assert_eq!(records[0].payload(), &json!({}));
    assert_eq!(records[0].duration_ms(), 0);
}

#[tokio::test]
async fn model_input_and_output_are_kept_only_as_digests() {
    let store = Arc::new(FakeAuditStore::new(ManualClock::starting_at(epoch())));
    let service = service_with(store.clone());
    let input = json!({"prompt": "summarise the report for bob@corp.io"});
    let output = json!("The report covers Q3.");

    let submitted = service
        .submit(
            RawAuditEvent {
                event_type: Some("inference_response".to_owned()),
                inference_id: Some("inf_9f2c".to_owned()),
                input: Some(input.clone()),
                output: Some(output.clone()),
                ..inference_event()
            },
            TIMEOUT,
        )
        .await;
    assert!(submitted.is_ok());

    let records = store.records().await;
    let record = &records[0];
    let expected_input = content_digest(&input);
    let expected_output = content_digest(&output);
    assert_eq!(record.input_hash(), Some(expected_input.as_str()));
    assert_eq!(record.output_hash(), Some(expected_output.as_str()));
    assert_eq!(record.inference_id(), Some("inf_9f2c"));
    assert!(!record.payload().to_string().contains("bob@corp.io"));
}

#[tokio::test(start_paused = true)]
async fn slow_store_surfaces_timeout() {
    let store = Arc::new(FakeAuditStore::slow(
        ManualClock::starting_at(epoch()),
        Duration::from_secs(30),
    ));
    let service = service_with(store.clone());

    let result = service
        .submit(inference_event(), Duration::from_millis(200))
        .await;

    assert!(matches!(
        result,
        Err(AppError::TimeoutExceeded {
            operation: "append",
            timeout_ms: 200
        })
    ));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn store_outage_is_reported_not_retried() {
    let store = Arc::new(FakeAuditStore::unavailable(ManualClock::starting_at(
        epoch(),
    )));
    let service = service_with(store.clone());

    let result = service.submit(inference_event(), TIMEOUT).await;

    assert!(matches!(
        result,
        Err(AppError::StoreUnavailable {
            operation: "append",
            ..
        })
    ));
    assert!(result.is_err_and(|error| error.is_retryable()));
    assert_eq!(store.len().await, 0);
}
