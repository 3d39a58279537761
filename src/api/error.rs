//! Error types for the HTTP API client.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by [`HttpJobApi`](super::HttpJobApi).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the client configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the request could not be sent or the response not read.
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        /// Endpoint path that was called.
        endpoint: String,
        /// Message returned by the HTTP client.
        message: String,
    },
    /// Raised when the service answers with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Status {
        /// Endpoint path that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Endpoint path that was called.
        endpoint: String,
        /// Deserialisation error.
        message: String,
    },
    /// Raised when the workspace archive cannot be read for upload.
    #[error("failed to read upload {path}: {message}")]
    Upload {
        /// Archive path.
        path: String,
        /// Human-readable error message.
        message: String,
    },
}

impl From<ConfigError> for ApiError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
