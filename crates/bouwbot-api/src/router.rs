use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/chat", post(handlers::handle_chat))
        .route("/api/history", get(handlers::get_history))
        .route("/api/reset", post(handlers::reset_session))
        .route("/output/{filename}", get(handlers::serve_output))
        .with_state(state)
}
