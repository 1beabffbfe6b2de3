use std::sync::Arc;

use axum::{extract::State, Json};
use uuid::Uuid;

use crate::dto::{ChatRequestBody, ChatResponseBody, MapView};
use crate::error::ApiError;
use crate::services::orchestrator;
use crate::state::AppState;

/// One chat turn: validate, run the two-phase tool loop, report the new map
/// view when a tool changed it.
pub async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let message = body.message.trim();
    if message.is_empty() {
        // Rejected before any provider or tool work happens
        return Err(ApiError::bad_request("Message must not be empty"));
    }

    let session_id = body.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    // Only this session's lock is held across the turn; other sessions'
    // chats, history and reset proceed in parallel.
    let session = state.session(&session_id).await;
    let mut conversation = session.lock().await;

    let (reply, map_changed) = orchestrator::run_turn(
        state.provider.as_ref(),
        &state.tools,
        &state.catalog,
        &mut conversation,
        message,
    )
    .await?;

    let map = map_changed.then(|| MapView::from(&*conversation));

    Ok(Json(ChatResponseBody { ok: true, session_id, reply, map }))
}
