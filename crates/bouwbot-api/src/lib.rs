//! HTTP surface for the BouwBot assistant: the chat endpoint with its
//! two-phase tool orchestration, session history, and the generated-file
//! route the map renderer fetches overlays from.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod services;
pub mod state;

pub use router::create_router;
pub use state::AppState;
