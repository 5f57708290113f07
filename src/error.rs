//! Error types for Merke.

use thiserror::Error;

/// Library-level error type for Merke operations.
#[derive(Error, Debug)]
pub enum MerkeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio extraction failed: {0}")]
    AudioExtraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Artifact generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Stored record is malformed: {0}")]
    MalformedRecord(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Text generation is not configured. Set OPENAI_API_KEY.")]
    NotConfigured,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Merke operations.
pub type Result<T> = std::result::Result<T, MerkeError>;
