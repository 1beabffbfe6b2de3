//! Session-scoped conversation and map view state.

use crate::models::tool::{LayerDescriptor, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), timestamp: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), timestamp: Utc::now() }
    }
}

/// State owned by one chat session: the transcript shown to the user and the
/// current map view. Mutated only by the orchestrator and by
/// [`ConversationState::apply_map_from_tool_result`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub map_center: [f64; 2],
    pub map_zoom: u32,
    pub map_layers: Vec<LayerDescriptor>,
}

impl ConversationState {
    pub fn new(center: [f64; 2], zoom: u32) -> Self {
        Self {
            messages: Vec::new(),
            map_center: center,
            map_zoom: zoom,
            map_layers: Vec::new(),
        }
    }

    /// Drop the transcript and restore the default map view.
    pub fn reset(&mut self, center: [f64; 2], zoom: u32) {
        *self = Self::new(center, zoom);
    }

    /// Merge a tool result's `map` payload into this state.
    ///
    /// Returns `true` when at least one of `center`/`zoom`/`layers` was
    /// present in the payload. Key presence counts as a change even when the
    /// incoming value equals the current one; that keeps the function
    /// idempotent and spares tools from diffing against view state they
    /// cannot see.
    pub fn apply_map_from_tool_result(&mut self, result: &ToolResult) -> bool {
        if !result.ok {
            return false;
        }
        let Some(map) = &result.map else {
            return false;
        };

        let mut changed = false;
        if let Some(center) = map.center {
            self.map_center = center;
            changed = true;
        }
        if let Some(zoom) = map.zoom {
            self.map_zoom = zoom;
            changed = true;
        }
        if let Some(layers) = &map.layers {
            self.map_layers = layers.clone();
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::MapPayload;

    fn state() -> ConversationState {
        ConversationState::new([52.3730796, 4.8924534], 12)
    }

    fn result_with_map(map: MapPayload) -> ToolResult {
        ToolResult::success("ok").with_map(map)
    }

    #[test]
    fn failed_result_leaves_state_untouched() {
        let mut s = state();
        let before = s.clone();

        let mut failed = ToolResult::failure("Utrecht only");
        failed.map = Some(MapPayload {
            center: Some([52.0907, 5.1214]),
            zoom: Some(15),
            layers: None,
        });

        assert!(!s.apply_map_from_tool_result(&failed));
        assert_eq!(s, before);
    }

    #[test]
    fn result_without_map_reports_unchanged() {
        let mut s = state();
        let before = s.clone();

        assert!(!s.apply_map_from_tool_result(&ToolResult::success("no map here")));
        assert_eq!(s, before);
    }

    #[test]
    fn partial_payload_updates_only_present_keys() {
        let mut s = state();
        s.map_layers = vec![LayerDescriptor::Marker {
            lat: 1.0,
            lon: 2.0,
            label: "old".into(),
        }];

        let result = result_with_map(MapPayload {
            center: Some([52.0907, 5.1214]),
            zoom: None,
            layers: None,
        });

        assert!(s.apply_map_from_tool_result(&result));
        assert_eq!(s.map_center, [52.0907, 5.1214]);
        assert_eq!(s.map_zoom, 12);
        assert_eq!(s.map_layers.len(), 1);
    }

    #[test]
    fn apply_is_idempotent_and_presence_counts_as_change() {
        let mut s = state();
        let result = result_with_map(MapPayload {
            center: Some([52.0907, 5.1214]),
            zoom: Some(14),
            layers: Some(vec![LayerDescriptor::Circle {
                lat: 52.0907,
                lon: 5.1214,
                radius_m: 400.0,
            }]),
        });

        assert!(s.apply_map_from_tool_result(&result));
        let after_first = s.clone();

        // Second application: same final state, still reports a change
        // because the keys are present (documented key-presence policy).
        assert!(s.apply_map_from_tool_result(&result));
        assert_eq!(s, after_first);
    }

    #[test]
    fn reset_restores_defaults_and_clears_transcript() {
        let mut s = state();
        s.messages.push(ChatMessage::user("hoeveel gebouwen staan hier?"));
        s.map_zoom = 16;

        s.reset([52.3730796, 4.8924534], 12);
        assert!(s.messages.is_empty());
        assert_eq!(s.map_zoom, 12);
        assert!(s.map_layers.is_empty());
    }
}
