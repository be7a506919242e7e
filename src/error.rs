//! Error types for the Fish Audio client library.

use thiserror::Error;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;

/// Error type for Fish Audio client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket request could not be built.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The API key could not be used as a header value.
    #[error("Invalid authorization header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// The configured base URL cannot be turned into an endpoint.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No API key was configured.
    #[error("API key not set")]
    MissingApiKey,

    /// MessagePack serialization error.
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("{status} {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Detail message from the server, or the status reason.
        message: String,
    },

    /// Open handshake was not acknowledged in time.
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// Socket failed or closed before the stream finished.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Inbound frame was malformed, unknown, or out of place.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server finished the stream with an error.
    #[error("Remote synthesis error")]
    RemoteSynthesis,

    /// The caller's text stream failed.
    #[error("Text source error: {0}")]
    TextSource(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Returns the HTTP status for [`Error::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the server rejected the credentials (401).
    pub fn is_authentication(&self) -> bool {
        self.status() == Some(401)
    }

    /// Returns true if the account has no remaining credit (402).
    pub fn is_payment_required(&self) -> bool {
        self.status() == Some(402)
    }

    /// Returns true if the requested resource does not exist (404).
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_classification() {
        let err = Error::Http {
            status: 402,
            message: "Payment required".to_string(),
        };
        assert!(err.is_payment_required());
        assert!(!err.is_authentication());
        assert_eq!(err.to_string(), "402 Payment required");

        assert!(!Error::ConnectionTimeout.is_not_found());
        assert_eq!(Error::RemoteSynthesis.status(), None);
    }
}
