use serde::Deserialize;

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    /// Omit to start a fresh session; the response carries the assigned id
    pub session_id: Option<String>,
}

/// Session selector for history and reset
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}
