use serde::Serialize;

use bouwbot_core::models::{ChatMessage, ConversationState, LayerDescriptor};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
}

/// Current map view, sent only when a tool turn changed it.
#[derive(Debug, Serialize)]
pub struct MapView {
    pub center: [f64; 2],
    pub zoom: u32,
    pub layers: Vec<LayerDescriptor>,
}

impl From<&ConversationState> for MapView {
    fn from(state: &ConversationState) -> Self {
        Self {
            center: state.map_center,
            zoom: state.map_zoom,
            layers: state.map_layers.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub ok: bool,
    pub session_id: String,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapView>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
    pub session_id: String,
    pub map: MapView,
}
