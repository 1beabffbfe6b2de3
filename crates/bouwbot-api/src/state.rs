use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use bouwbot_core::models::ConversationState;
use bouwbot_engine::ToolRouter;
use bouwbot_llm::ChatProvider;

/// One session's state behind its own lock. A chat turn holds this lock
/// across provider and tool awaits; only turns for the same session
/// serialize against each other.
pub type SharedSession = Arc<Mutex<ConversationState>>;

/// Shared application state.
///
/// The session map lock is held only for lookup and insert, never across a
/// chat turn.
pub struct AppState {
    pub provider: Arc<dyn ChatProvider>,
    pub tools: ToolRouter,
    pub catalog: Vec<Value>,
    sessions: Mutex<HashMap<String, SharedSession>>,
    pub default_center: [f64; 2],
    pub default_zoom: u32,
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        tools: ToolRouter,
        catalog: Vec<Value>,
        default_center: [f64; 2],
        default_zoom: u32,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            provider,
            tools,
            catalog,
            sessions: Mutex::new(HashMap::new()),
            default_center,
            default_zoom,
            output_dir,
        }
    }

    pub fn new_session(&self) -> ConversationState {
        ConversationState::new(self.default_center, self.default_zoom)
    }

    /// Fetch or create a session. The map lock is released before returning.
    pub async fn session(&self, id: &str) -> SharedSession {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(self.new_session())))
            .clone()
    }

    /// Fetch an existing session without creating one.
    pub async fn existing_session(&self, id: &str) -> Option<SharedSession> {
        self.sessions.lock().await.get(id).cloned()
    }
}
