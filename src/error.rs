//! Error types for promtune.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromtuneError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Missing required setting: {name}")]
    MissingSetting { name: String },

    // Metrics fetch errors
    #[error("Range query failed: {message}")]
    Query { message: String },

    #[error("Prometheus returned HTTP status {status}: {body}")]
    QueryStatus { status: u16, body: String },

    #[error("Unexpected range query response: {message}")]
    QueryResponse { message: String },

    // PCM container errors
    #[error("Failed to encode PCM chunk: {message}")]
    Encode { message: String },

    #[error("Failed to decode PCM chunk: {message}")]
    Decode { message: String },

    // Audio output errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("Playback ended before the stream queue drained")]
    PlaybackInterrupted,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, PromtuneError>;
