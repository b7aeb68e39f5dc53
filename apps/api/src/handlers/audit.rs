use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use gpuaudit_application::AuditScan;
use gpuaudit_domain::LogId;
use tracing::info;

use crate::api_config::window_from_hours;
use crate::dto::{
    AuditEventSearchQuery, AuditRecordResponse, AuditRecordSummaryResponse, RecentAuditQuery,
    RecentAuditRecordResponse, SubmitAuditEventRequest, SubmitAuditEventResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn submit_audit_event_handler(
    State(state): State<AppState>,
    payload: Result<Json<SubmitAuditEventRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitAuditEventResponse>)> {
    let Json(payload) = payload?;

    let log_id = state
        .ingestion_service
        .submit(payload.into(), state.operation_timeout)
        .await?;
    info!(log_id = %log_id, "audit event accepted");

    Ok((
        StatusCode::CREATED,
        Json(SubmitAuditEventResponse {
            log_id: log_id.to_string(),
        }),
    ))
}

pub async fn get_audit_event_handler(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
) -> ApiResult<Json<AuditRecordResponse>> {
    let log_id = log_id.parse::<LogId>()?;
    let record = state
        .query_service
        .get(log_id, state.operation_timeout)
        .await?;

    Ok(Json(AuditRecordResponse::from(record)))
}

pub async fn search_audit_events_handler(
    State(state): State<AppState>,
    query: Result<Query<AuditEventSearchQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AuditRecordResponse>>> {
    let Query(query) = query?;
    let scan = AuditScan::try_from(query)?;

    let records = state
        .query_service
        .search(scan, state.operation_timeout)
        .await?
        .into_iter()
        .map(AuditRecordResponse::from)
        .collect();

    Ok(Json(records))
}

pub async fn recent_audit_events_handler(
    State(state): State<AppState>,
    query: Result<Query<RecentAuditQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RecentAuditRecordResponse>>> {
    let Query(query) = query?;
    let window = match query.window_hours.as_deref().map(str::trim) {
        None | Some("") => state.recent_window,
        Some(hours) => window_from_hours("window_hours", hours)?,
    };

    let records = state
        .query_service
        .recent(window, state.operation_timeout)
        .await?
        .into_iter()
        .map(RecentAuditRecordResponse::from)
        .collect();

    Ok(Json(records))
}

pub async fn user_audit_events_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<AuditRecordSummaryResponse>>> {
    let records = state
        .query_service
        .by_user(user_id.as_str(), state.operation_timeout)
        .await?
        .into_iter()
        .map(AuditRecordSummaryResponse::from)
        .collect();

    Ok(Json(records))
}

#[cfg(test)]
mod tests;
