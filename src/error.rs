use crate::models::ApiErrorInfo;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZImageError {
    #[error("Submission failed ({status}): {message}")]
    SubmissionFailed { status: u16, message: String },

    #[error("Polling failed with status {status}")]
    PollingFailed { status: u16 },

    #[error("Image generation failed: {0}")]
    GenerationFailed(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Image download failed with status {status}")]
    DownloadFailed { status: u16 },

    #[error("{0}")]
    ChatRequestFailed(ApiErrorInfo),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ZImageError {
    /// HTTP status behind this error, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ZImageError::SubmissionFailed { status, .. }
            | ZImageError::PollingFailed { status }
            | ZImageError::DownloadFailed { status } => Some(*status),
            ZImageError::ChatRequestFailed(info) => Some(info.http_status),
            _ => None,
        }
    }

    /// Short user-facing hint for the statuses a UI should tell apart.
    pub fn hint(&self) -> Option<&'static str> {
        self.status().and_then(status_hint)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ZImageError::Cancelled)
    }
}

pub fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("API key is invalid or expired"),
        429 => Some("Too many requests, please try again later"),
        500..=599 => Some("The inference service had an internal error"),
        _ => None,
    }
}

impl From<reqwest::Error> for ZImageError {
    fn from(err: reqwest::Error) -> Self {
        ZImageError::TransportError(err.to_string())
    }
}

impl From<serde_json::Error> for ZImageError {
    fn from(err: serde_json::Error) -> Self {
        ZImageError::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for ZImageError {
    fn from(err: base64::DecodeError) -> Self {
        ZImageError::DecodeError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ZImageError>;
