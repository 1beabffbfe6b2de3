//! Two-phase chat orchestration.
//!
//! Phase one offers the tool catalog against a fresh system+user prompt.
//! If the model answers in plain text the turn ends there. Otherwise every
//! requested tool runs exactly once, results are folded back into the
//! conversation as tool messages, and phase two asks the model to phrase
//! the final answer without tools. There are no retries; a tool failure is
//! handed to the model as data to explain.

use serde_json::Value;

use bouwbot_core::error::Result;
use bouwbot_core::models::{ChatMessage, ConversationState, ToolResult};
use bouwbot_engine::ToolRouter;
use bouwbot_llm::{ChatProvider, ChatRequest, Message};

const SYSTEM_PROMPT: &str = "\
You are BouwBot, an assistant for exploring 3D building data in Utrecht, \
the Netherlands. You answer questions about building heights, footprints \
and volumes by calling the provided tools. Resolve place names with \
geocode_location before running spatial queries. Only locations within \
Utrecht are supported; say so when asked about anywhere else. Tools return \
distances and heights in meters, areas in square meters and volumes in \
cubic meters. Answer in the language the user writes in; keep answers \
short and concrete, and mention the numbers the tools returned.";

const FALLBACK_REPLY: &str =
    "I ran the requested analysis but could not phrase a summary. Please try again.";

/// Run one user turn against the provider. Returns the assistant reply and
/// whether any tool changed the map view.
///
/// Session state is committed only once the whole turn has succeeded: a
/// provider failure in either phase leaves the transcript and map untouched.
pub async fn run_turn(
    provider: &dyn ChatProvider,
    tools: &ToolRouter,
    catalog: &[Value],
    conversation: &mut ConversationState,
    message: &str,
) -> Result<(String, bool)> {
    // Phase one sees only the system prompt and the current message; the
    // transcript is for the user, not for tool selection.
    let mut wire = vec![Message::system(SYSTEM_PROMPT), Message::user(message)];

    let first = provider
        .complete(ChatRequest { messages: wire.clone(), tools: catalog.to_vec() })
        .await?;

    if first.tool_calls.is_empty() {
        let reply = first.content.unwrap_or_else(|| FALLBACK_REPLY.to_string());
        commit(conversation, message, &reply);
        return Ok((reply, false));
    }

    if let Some(assistant) = first.assistant_message {
        wire.push(assistant);
    }

    let mut results = Vec::with_capacity(first.tool_calls.len());
    for call in &first.tool_calls {
        let args: Value = serde_json::from_str(&call.arguments)
            .unwrap_or(Value::Object(serde_json::Map::new()));

        let result = tools.call_tool(&call.name, args).await;

        tracing::debug!(tool = %call.name, ok = result.ok, "tool executed");

        wire.push(Message::tool(&call.id, serialize_result(&result)));
        results.push(result);
    }

    // Phase two: no tools on offer, the model only phrases the answer
    let second = provider.complete(ChatRequest { messages: wire, tools: Vec::new() }).await?;
    let reply = second.content.unwrap_or_else(|| FALLBACK_REPLY.to_string());

    let mut map_changed = false;
    for result in &results {
        map_changed |= conversation.apply_map_from_tool_result(result);
    }
    commit(conversation, message, &reply);
    Ok((reply, map_changed))
}

/// Append the user/assistant pair to the transcript as one unit.
fn commit(conversation: &mut ConversationState, message: &str, reply: &str) {
    conversation.messages.push(ChatMessage::user(message));
    conversation.messages.push(ChatMessage::assistant(reply));
}

fn serialize_result(result: &ToolResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|_| "{\"ok\":false}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    use geo::{polygon, MultiPolygon};
    use serde_json::json;

    use bouwbot_core::config::EngineConfig;
    use bouwbot_engine::{BufferQueryEngine, BuildingStore, Geocoder, ToolRouter};
    use bouwbot_llm::{ChatCompletion, ToolCallRequest};

    /// Provider that replays a fixed script of completions or failures.
    struct MockProvider {
        script: Mutex<Vec<Result<ChatCompletion>>>,
    }

    impl MockProvider {
        fn new(script: Vec<ChatCompletion>) -> Self {
            Self::scripted(script.into_iter().map(Ok).collect())
        }

        fn scripted(script: Vec<Result<ChatCompletion>>) -> Self {
            // Popped from the back, so store in reverse
            let mut script = script;
            script.reverse();
            Self { script: Mutex::new(script) }
        }
    }

    #[async_trait::async_trait]
    impl ChatProvider for MockProvider {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion> {
            self.script.lock().unwrap().pop().expect("script exhausted")
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn provider_down() -> bouwbot_core::error::BouwbotError {
        bouwbot_core::error::BouwbotError::ProviderUnavailable {
            reason: "connection refused".to_string(),
            remediation: "check the chat provider endpoint".to_string(),
        }
    }

    fn text_completion(content: &str) -> ChatCompletion {
        ChatCompletion {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            assistant_message: None,
        }
    }

    fn tool_completion(name: &str, arguments: Value) -> ChatCompletion {
        ChatCompletion {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
            assistant_message: Some(Message::assistant("")),
        }
    }

    fn router() -> ToolRouter {
        // Empty dataset is fine: these tests only exercise tools that do
        // not touch building records.
        let boundary = MultiPolygon(vec![polygon![
            (x: 5.0, y: 52.0),
            (x: 5.25, y: 52.0),
            (x: 5.25, y: 52.18),
            (x: 5.0, y: 52.18),
            (x: 5.0, y: 52.0),
        ]]);
        let store = Arc::new(BuildingStore::from_parts(Vec::new(), boundary, 28992));
        let config = EngineConfig::with_defaults();
        let engine = Arc::new(BufferQueryEngine::new(store, &config));
        let geocoder = Arc::new(Geocoder::new("http://127.0.0.1:1/search"));
        ToolRouter::new(engine, geocoder)
    }

    fn conversation() -> ConversationState {
        ConversationState::new([52.3730796, 4.8924534], 12)
    }

    #[tokio::test]
    async fn plain_text_answer_skips_tools() {
        let provider = MockProvider::new(vec![text_completion("Hallo! Vraag me iets over Utrecht.")]);
        let tools = router();
        let mut state = conversation();

        let (reply, map_changed) =
            run_turn(&provider, &tools, &[], &mut state, "hallo").await.unwrap();

        assert_eq!(reply, "Hallo! Vraag me iets over Utrecht.");
        assert!(!map_changed);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "hallo");
        assert_eq!(state.messages[1].content, reply);
    }

    #[tokio::test]
    async fn tool_turn_updates_map_and_runs_phase_two() {
        let provider = MockProvider::new(vec![
            tool_completion(
                "buffer_point",
                json!({ "lat": 52.09, "lon": 5.12, "radius_m": 400 }),
            ),
            text_completion("I drew a 400m buffer on the map."),
        ]);
        let tools = router();
        let mut state = conversation();

        let (reply, map_changed) =
            run_turn(&provider, &tools, &[], &mut state, "draw a buffer").await.unwrap();

        assert_eq!(reply, "I drew a 400m buffer on the map.");
        assert!(map_changed);
        assert_eq!(state.map_center, [52.09, 5.12]);
        assert_eq!(state.map_zoom, 15);
        assert_eq!(state.map_layers.len(), 2);
    }

    #[tokio::test]
    async fn failed_tool_still_produces_an_answer_without_map_change() {
        let provider = MockProvider::new(vec![
            tool_completion("no_such_tool", json!({})),
            text_completion("That operation is not available."),
        ]);
        let tools = router();
        let mut state = conversation();
        let before = state.clone();

        let (reply, map_changed) =
            run_turn(&provider, &tools, &[], &mut state, "do something odd").await.unwrap();

        assert_eq!(reply, "That operation is not available.");
        assert!(!map_changed);
        assert_eq!(state.map_center, before.map_center);
        assert!(state.map_layers.is_empty());
    }

    #[tokio::test]
    async fn malformed_arguments_fall_back_to_empty_object() {
        // buffer_point with no args fails on missing lat, inline, not a panic
        let provider = MockProvider::new(vec![
            ChatCompletion {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "buffer_point".to_string(),
                    arguments: "not json".to_string(),
                }],
                assistant_message: Some(Message::assistant("")),
            },
            text_completion("I could not run that."),
        ]);
        let tools = router();
        let mut state = conversation();

        let (reply, map_changed) =
            run_turn(&provider, &tools, &[], &mut state, "buffer please").await.unwrap();

        assert_eq!(reply, "I could not run that.");
        assert!(!map_changed);
    }

    #[tokio::test]
    async fn phase_one_failure_leaves_transcript_untouched() {
        let provider = MockProvider::scripted(vec![Err(provider_down())]);
        let tools = router();
        let mut state = conversation();

        let err = run_turn(&provider, &tools, &[], &mut state, "hallo").await.unwrap_err();

        assert!(err.to_string().contains("Chat provider unavailable"));
        assert!(state.messages.is_empty());
        assert!(state.map_layers.is_empty());
    }

    #[tokio::test]
    async fn phase_two_failure_rolls_back_map_and_transcript() {
        let provider = MockProvider::scripted(vec![
            Ok(tool_completion(
                "buffer_point",
                json!({ "lat": 52.09, "lon": 5.12, "radius_m": 400 }),
            )),
            Err(provider_down()),
        ]);
        let tools = router();
        let mut state = conversation();
        let before = state.clone();

        let err = run_turn(&provider, &tools, &[], &mut state, "draw a buffer").await.unwrap_err();

        assert!(err.to_string().contains("Chat provider unavailable"));
        assert!(state.messages.is_empty());
        assert_eq!(state.map_center, before.map_center);
        assert_eq!(state.map_zoom, before.map_zoom);
        assert!(state.map_layers.is_empty());
    }
}
