use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/api/audit/events",
            get(handlers::audit::search_audit_events_handler)
                .post(handlers::audit::submit_audit_event_handler),
        )
        .route(
            "/api/audit/events/{log_id}",
            get(handlers::audit::get_audit_event_handler),
        )
        .route(
            "/api/audit/recent",
            get(handlers::audit::recent_audit_events_handler),
        )
        .route(
            "/api/audit/users/{user_id}/events",
            get(handlers::audit::user_audit_events_handler),
        )
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(app_state)
}

/// Request span that names the route template. Raw paths can carry user
/// identifiers and are never recorded.
fn request_span(request: &Request) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        route = route_label(request),
        version = ?request.version(),
    )
}

fn route_label(request: &Request) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str)
}
