//! Payload decoding errors

use thiserror::Error;

/// Failure to decode a REST or WebSocket payload
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not valid JSON for the expected shape
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String, raw: Option<String> },

    /// Envelope carried an unexpected stream name
    #[error("Unexpected stream {stream}")]
    UnexpectedStream { stream: String },

    /// Message is well-formed but not one we understand
    #[error("Unexpected message format: {0}")]
    UnexpectedMessage(String),
}

impl DecodeError {
    /// Build an `InvalidJson` error, keeping the raw text for logging
    pub fn invalid_json(err: serde_json::Error, raw: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
            raw: Some(raw.into()),
        }
    }

    /// Raw payload, if one was captured
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::InvalidJson { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;
