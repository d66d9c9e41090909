//! Error types for courier.

use thiserror::Error;

/// Failure of a network exchange.
///
/// Stored on the token when it fails, so it is cheap to clone. HTTP status
/// codes are never mapped here; a 404 is a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response body failed: {0}")]
    Body(String),

    #[error("transport setup failed: {0}")]
    Setup(String),

    #[error("no async runtime available to drive the request")]
    NoRuntime,

    #[error("worker dropped before the request started")]
    WorkerDropped,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else if e.is_builder() {
            TransportError::Setup(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Errors raised synchronously while building or preparing a token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("token already started; request is no longer mutable")]
    AlreadyStarted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T, E = TokenError> = std::result::Result<T, E>;
