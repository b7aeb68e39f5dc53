use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use gpuaudit_application::{
    AuditIngestionService, AuditQueryService, AuditScan, AuditStore, DEFAULT_RECENT_WINDOW,
    RedactionPolicy, Redactor,
};
use gpuaudit_core::AppResult;
use gpuaudit_domain::{AuditRecord, LogId, NewAuditRecord};
use gpuaudit_infrastructure::{InMemoryAuditStore, ManualClock};

use crate::api_router::build_router;
use crate::state::AppState;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

fn test_router() -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(epoch()));
    let store = Arc::new(InMemoryAuditStore::with_clock(clock.clone()));
    (router_over(store, clock.clone(), Duration::from_secs(5)), clock)
}

fn router_over(store: Arc<dyn AuditStore>, clock: Arc<ManualClock>, timeout: Duration) -> Router {
    let redactor =
        Arc::new(Redactor::new(RedactionPolicy::default()).unwrap_or_else(|_| unreachable!()));

    build_router(AppState {
        ingestion_service: AuditIngestionService::new(store.clone(), redactor.clone()),
        query_service: AuditQueryService::new(store.clone(), redactor, clock),
        audit_store: store,
        store_backend: "memory",
        operation_timeout: timeout,
        recent_window: DEFAULT_RECENT_WINDOW,
    })
}

/// Store whose health check never answers.
struct UnresponsiveStore(InMemoryAuditStore);

#[async_trait]
impl AuditStore for UnresponsiveStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<LogId> {
        self.0.append(record).await
    }

    async fn get_by_id(&self, log_id: LogId) -> AppResult<AuditRecord> {
        self.0.get_by_id(log_id).await
    }

    async fn scan(&self, scan: AuditScan) -> AppResult<Vec<AuditRecord>> {
        self.0.scan(scan).await
    }

    async fn ping(&self) -> AppResult<()> {
        std::future::pending().await
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap_or_else(|_| unreachable!());

    let response = router
        .clone()
        .oneshot(request)
        .await
        .unwrap_or_else(|error| panic!("router failed: {error}"));
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, body)
}

fn event(user_id: &str) -> Value {
    json!({
        "event_type": "inference_request",
        "model_name": "llama-70b",
        "status": "success",
        "user_id": user_id,
        "duration_ms": 120,
        "payload": {"email": "a@b.com", "note": "hi"}
    })
}

async fn submit(router: &Router, body: Value) -> String {
    let (status, body) = send(router, Method::POST, "/api/audit/events", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    body["log_id"].as_str().unwrap_or_default().to_owned()
}

#[tokio::test]
async fn empty_event_is_rejected_and_not_stored() {
    let (router, _) = test_router();

    let (status, body) = send(&router, Method::POST, "/api/audit/events", Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
    assert_eq!(body["field"], "event_type");
    assert_eq!(body["retryable"], false);

    let (_, listed) = send(&router, Method::GET, "/api/audit/events", None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let (router, _) = test_router();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/audit/events")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap_or_else(|_| unreachable!());
    let response = router
        .oneshot(request)
        .await
        .unwrap_or_else(|error| panic!("router failed: {error}"));

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submitted_event_is_stored_redacted() {
    let (router, _) = test_router();

    let log_id = submit(&router, event("alice")).await;
    let (status, body) = send(
        &router,
        Method::GET,
        &format!("/api/audit/events/{log_id}"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["log_id"], log_id.as_str());
    assert_eq!(body["payload"], json!({"email": "[REDACTED]", "note": "hi"}));
    assert_eq!(body["pii_redacted"], true);
    assert_eq!(body["duration_ms"], 120);
    assert_eq!(body["timestamp"], "2026-03-01T12:00:00.000000Z");
    assert!(
        body["user_id"]
            .as_str()
            .is_some_and(|user_id| user_id.starts_with("sha256:"))
    );
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_distinguished() {
    let (router, _) = test_router();

    let (missing, body) = send(
        &router,
        Method::GET,
        "/api/audit/events/00000000-0000-0000-0000-000000000001",
        None,
    )
    .await;
    let (malformed, _) = send(&router, Method::GET, "/api/audit/events/nope", None).await;

    assert_eq!(missing, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
    assert_eq!(malformed, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recent_view_honours_default_and_explicit_windows() {
    let (router, clock) = test_router();

    clock.set(epoch() - TimeDelta::days(8));
    submit(&router, event("alice")).await;
    clock.set(epoch() - TimeDelta::days(1));
    submit(&router, event("alice")).await;
    clock.set(epoch());

    let (status, recent) = send(&router, Method::GET, "/api/audit/recent", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recent.as_array().map(Vec::len), Some(1));
    assert!(recent[0].get("payload").is_none());

    let (_, wide) = send(
        &router,
        Method::GET,
        "/api/audit/recent?window_hours=240",
        None,
    )
    .await;
    assert_eq!(wide.as_array().map(Vec::len), Some(2));

    let (invalid, _) = send(
        &router,
        Method::GET,
        "/api/audit/recent?window_hours=0",
        None,
    )
    .await;
    assert_eq!(invalid, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_events_return_summaries_only() {
    let (router, clock) = test_router();

    submit(&router, event("alice")).await;
    clock.advance(TimeDelta::seconds(1));
    submit(&router, event("bob")).await;
    clock.advance(TimeDelta::seconds(1));
    let newest = submit(&router, event("alice")).await;

    let (status, body) = send(&router, Method::GET, "/api/audit/users/alice/events", None).await;

    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().cloned().unwrap_or_default();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["log_id"], newest.as_str());
    assert!(
        records
            .iter()
            .all(|record| record.get("payload").is_none() && record.get("user_id").is_none())
    );
}

#[tokio::test]
async fn search_filters_and_rejects_bad_parameters() {
    let (router, _) = test_router();

    submit(&router, event("alice")).await;
    let mut blocked = event("bob");
    blocked["status"] = json!("blocked");
    submit(&router, blocked).await;

    let (status, body) = send(
        &router,
        Method::GET,
        "/api/audit/events?status=blocked&limit=10",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["status"], "blocked");

    let (bad_order, _) = send(&router, Method::GET, "/api/audit/events?order=up", None).await;
    assert_eq!(bad_order, StatusCode::BAD_REQUEST);

    let (bad_limit, _) = send(&router, Method::GET, "/api/audit/events?limit=many", None).await;
    assert_eq!(bad_limit, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_store_backend() {
    let (router, _) = test_router();

    let (status, body) = send(&router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "store": "memory", "detail": null}));
}

#[tokio::test]
async fn unresponsive_store_reports_degraded_within_the_deadline() {
    let clock = Arc::new(ManualClock::new(epoch()));
    let store = UnresponsiveStore(InMemoryAuditStore::with_clock(clock.clone()));
    let router = router_over(Arc::new(store), clock, Duration::from_millis(20));

    let (status, body) = send(&router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|detail| detail.contains("ping"))
    );
}
