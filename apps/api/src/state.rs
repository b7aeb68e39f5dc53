use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use gpuaudit_application::{AuditIngestionService, AuditQueryService, AuditStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ingestion_service: AuditIngestionService,
    pub query_service: AuditQueryService,
    pub audit_store: Arc<dyn AuditStore>,
    pub store_backend: &'static str,
    pub operation_timeout: Duration,
    pub recent_window: TimeDelta,
}
