use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tradelink_core::session::Action;
use tradelink_core::store::LinkStore;
use tradelink_core::view::ViewModel;
use uuid::Uuid;

use super::{error_response, store_error, ApiError};
use crate::state::{AppState, SessionEntry, SharedSession};

const TARGET: &str = "tradelink.api.sessions";

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        error_response(
            StatusCode::NOT_FOUND,
            TARGET,
            format!("Unknown session: {}", raw),
        )
    })
}

async fn find_session(state: &AppState, raw: &str) -> Result<(Uuid, SharedSession), ApiError> {
    let id = parse_session_id(raw)?;
    match state.session(&id).await {
        Some(entry) => Ok((id, entry)),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            TARGET,
            format!("Unknown session: {}", id),
        )),
    }
}

/// Re-render after a refresh. On failure the last good view is served with
/// `stale: true`; `None` only when the session never rendered.
async fn render(
    entry: &mut SessionEntry,
    store: &LinkStore,
    id: &Uuid,
) -> Result<(ViewModel, bool), Option<ViewModel>> {
    let SessionEntry { session, view, .. } = entry;
    let refreshed = view.refresh(store, session).await.cloned();
    match refreshed {
        Ok(fresh) => Ok((fresh, false)),
        Err(e) => {
            log::warn!(
                target: TARGET,
                "Refresh failed for session {}, serving last view: {}",
                id,
                e
            );
            Err(view.last().cloned())
        }
    }
}

/// New sessions start in public mode with no filter or search.
pub async fn open_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let id = Uuid::new_v4();
    let mut entry = SessionEntry::default();
    let view = entry
        .view
        .refresh(&state.store, &entry.session)
        .await
        .map_err(|e| store_error(TARGET, "Failed to render initial view", e))?
        .clone();

    state
        .sessions
        .lock()
        .await
        .insert(id, Arc::new(Mutex::new(entry)));
    log::info!(target: TARGET, "Opened session {}", id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "sessionId": id, "view": view })),
    ))
}

pub async fn get_view(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (id, shared) = find_session(&state, &session_id).await?;
    let mut entry = shared.lock().await;
    entry.last_seen = Instant::now();

    let (view, stale) = match render(&mut entry, &state.store, &id).await {
        Ok(rendered) => rendered,
        Err(Some(last)) => (last, true),
        Err(None) => {
            return Err(error_response(
                StatusCode::BAD_GATEWAY,
                TARGET,
                format!("No view available for session {}", id),
            ))
        }
    };
    Ok(Json(serde_json::json!({ "view": view, "stale": stale })))
}

/// Dispatch one action. Ignored actions (public mode) still return the
/// current view. Once an action has been applied, a failed refresh never
/// turns into an error response.
pub async fn dispatch_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(action): Json<Action>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (id, shared) = find_session(&state, &session_id).await?;
    let mut entry = shared.lock().await;
    entry.last_seen = Instant::now();

    let outcome = entry
        .session
        .dispatch(action, &state.store)
        .await
        .map_err(|e| store_error(TARGET, format!("Action failed in session {}", id), e))?;

    let (view, stale) = match render(&mut entry, &state.store, &id).await {
        Ok((view, stale)) => (Some(view), stale),
        Err(last) => (last, true),
    };
    Ok(Json(serde_json::json!({
        "outcome": outcome,
        "view": view,
        "stale": stale,
    })))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&session_id)?;
    if state.sessions.lock().await.remove(&id).is_none() {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            TARGET,
            format!("Unknown session: {}", id),
        ));
    }
    log::info!(target: TARGET, "Closed session {}", id);
    Ok(StatusCode::NO_CONTENT)
}
