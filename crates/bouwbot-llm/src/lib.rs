//! Chat provider port and adapters.
//!
//! The orchestrator talks to a [`ChatProvider`] trait object; the only
//! shipped adapter speaks the OpenAI-compatible chat completions protocol
//! with function calling.

pub mod openai;
pub mod ports;

pub use openai::OpenAiChat;
pub use ports::{ChatCompletion, ChatProvider, ChatRequest, ChatRole, Message, ToolCallRequest};
