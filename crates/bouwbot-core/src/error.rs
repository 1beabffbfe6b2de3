//! Error types for BouwBot

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BouwbotError {
    // Dataset errors: fatal at first access, not recoverable per-request
    #[error("Building dataset not found at {path}")]
    DataNotFound { path: PathBuf },

    #[error("Layer {layer} loaded but contains no records")]
    DataEmpty { layer: String },

    #[error("Layer at {path} declares no CRS; meter-based buffering needs one (e.g. EPSG:28992)")]
    MissingCrs { path: PathBuf },

    #[error("Missing required column {column} in dataset")]
    MissingColumn { column: String },

    #[error("Invalid geometry in feature {feature_id}: {reason}")]
    InvalidGeometry { feature_id: String, reason: String },

    // Projection errors
    #[error("Projection failed: {reason}")]
    Projection { reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // External provider errors
    #[error("Chat provider unavailable: {reason}. Try: {remediation}")]
    ProviderUnavailable { reason: String, remediation: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, BouwbotError>;
