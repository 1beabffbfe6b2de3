//! Core types for BouwBot: error taxonomy, configuration, and the domain
//! models shared by the query engine, the tool registry, and the API.

pub mod config;
pub mod error;
pub mod models;

pub use config::EngineConfig;
pub use error::{BouwbotError, Result};
