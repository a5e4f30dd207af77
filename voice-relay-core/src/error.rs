//! Error types for voice-relay

use thiserror::Error;

/// The main error type for voice-relay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Session storage errors
    #[error("Session error: {0}")]
    Session(String),

    /// A stored transcript could not be parsed
    #[error("Corrupt session record '{key}': {reason}")]
    CorruptSession { key: String, reason: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// A specialized Result type for voice-relay operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
