//! Error types shared across the CDR pipeline

use thiserror::Error;

/// Result type alias for CDR operations
pub type Result<T> = std::result::Result<T, CdrError>;

/// Main error type for the CDR pipeline
#[derive(Error, Debug)]
pub enum CdrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown source type: {0}")]
    UnknownSource(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
