mod chat;
mod health;
mod history;
mod output;

pub use chat::handle_chat;
pub use health::health_check;
pub use history::{get_history, reset_session};
pub use output::serve_output;
