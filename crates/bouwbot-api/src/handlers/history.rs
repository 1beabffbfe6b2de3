use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::dto::{HistoryResponse, MapView, ResetResponse, SessionQuery};
use crate::error::ApiError;
use crate::state::AppState;

/// Transcript for one session. An unknown session id is simply an empty
/// transcript, not an error.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session_id = query
        .session_id
        .ok_or_else(|| ApiError::bad_request("session_id query parameter is required"))?;

    let messages = match state.existing_session(&session_id).await {
        Some(session) => session.lock().await.messages.clone(),
        None => Vec::new(),
    };

    Ok(Json(HistoryResponse { session_id, messages }))
}

/// Drop a session's transcript and restore the default map view.
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ResetResponse>, ApiError> {
    let session_id = query
        .session_id
        .ok_or_else(|| ApiError::bad_request("session_id query parameter is required"))?;

    let session = state.session(&session_id).await;
    let mut conversation = session.lock().await;
    conversation.reset(state.default_center, state.default_zoom);

    tracing::info!(session = %session_id, "session reset");

    Ok(Json(ResetResponse {
        ok: true,
        session_id,
        map: MapView::from(&*conversation),
    }))
}
