use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use gpuaudit_application::within_deadline;
use tracing::warn;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ping = within_deadline("ping", state.operation_timeout, state.audit_store.ping());
    match ping.await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: state.store_backend,
                detail: None,
            }),
        ),
        Err(error) => {
            warn!(store = state.store_backend, error = %error, "audit store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    store: state.store_backend,
                    detail: Some(error.to_string()),
                }),
            )
        }
    }
}
