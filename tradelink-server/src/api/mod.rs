use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tradelink_core::store::StoreError;

mod catalog;
mod events;
mod sessions;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /categories                      -> categories in display order
///   GET    /categories/:categoryId          -> one category
///   GET    /links?category=id&q=term        -> links, newest first, filtered
///   GET    /links/:linkId                   -> one link
///   POST   /sessions                        -> open a public-mode session (+ initial view)
///   GET    /sessions/:sessionId/view        -> re-render the session's view
///   POST   /sessions/:sessionId/actions     -> dispatch an action, then re-render
///   DELETE /sessions/:sessionId             -> drop a session
///   GET    /events                          -> SSE stream of committed changes
///   GET    /status                          -> health check
///   GET    /logs                            -> recent backend log entries
///   GET    /logs/stream                     -> SSE stream of backend log entries
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(catalog::list_categories))
        .route("/categories/{category_id}", get(catalog::get_category))
        .route("/links", get(catalog::list_links))
        .route("/links/{link_id}", get(catalog::get_link))
        .route("/sessions", post(sessions::open_session))
        .route(
            "/sessions/{session_id}",
            axum::routing::delete(sessions::close_session),
        )
        .route("/sessions/{session_id}/view", get(sessions::get_view))
        .route("/sessions/{session_id}/actions", post(sessions::dispatch_action))
        .route("/events", get(events::sse_events))
        .route("/status", get(events::status))
        .route("/logs", get(events::list_logs))
        .route("/logs/stream", get(events::stream_logs))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Storage(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Log a store failure and turn it into an error response.
fn store_error(target: &'static str, context: impl AsRef<str>, e: StoreError) -> ApiError {
    let status = store_status(&e);
    log_api_issue(status, target, format!("{}: {}", context.as_ref(), e));
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn error_response(status: StatusCode, target: &'static str, error: impl Into<String>) -> ApiError {
    let error = error.into();
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}
