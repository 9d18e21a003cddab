use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the connection, the hub and individual invocations.
///
/// Wrapped library errors are kept behind [`Arc`] so that a single close error
/// can be handed to every invocation still pending when a connection goes away.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum SignalRClientError {
    /// Operation attempted in a lifecycle state that does not allow it
    #[error("operation is not valid in the current connection state")]
    InvalidState,

    /// `stop` raced a `start` that was still in progress
    #[error("connection is being closed")]
    ConnectionIsBeingClosed,

    #[error("invalid negotiation response: {reason}")]
    InvalidNegotiationResponse { reason: String },

    #[error("negotiate request failed with HTTP status {status_code}")]
    WebError { status_code: u16 },

    #[error("handshake failed: {message}")]
    HandshakeError { message: String },

    #[error("unknown message type: {message_type}")]
    UnknownMessageType { message_type: u64 },

    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// Conversion between wire values and application types failed
    #[error("unsupported type: {reason}")]
    UnsupportedType { reason: String },

    #[error("protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// Error reported by the server for a particular invocation
    #[error("{message}")]
    HubInvocationError { message: String },

    /// Connection closed while the invocation was still pending
    #[error("hub invocation cancelled")]
    HubInvocationCancelled,

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Server closed the connection with an error
    #[error("server closed the connection: {message}")]
    ServerClosed { message: String },

    #[error("negotiation exceeded the limit of {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("server does not offer a transport supported by the client")]
    NoSupportedTransport,

    #[error("invalid url: {reason}")]
    InvalidUrl { reason: String },

    #[error("HTTP request error")]
    Http {
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("WebSocket error")]
    WebSocket {
        #[source]
        source: Arc<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("serialization error: {source}")]
    Serialization {
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl SignalRClientError {
    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        SignalRClientError::InvalidOperation {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_message(reason: impl Into<String>) -> Self {
        SignalRClientError::InvalidMessage {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_negotiation(reason: impl Into<String>) -> Self {
        SignalRClientError::InvalidNegotiationResponse {
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol_violation(message: impl Into<String>) -> Self {
        SignalRClientError::ProtocolViolation {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SignalRClientError {
    fn from(source: reqwest::Error) -> Self {
        SignalRClientError::Http {
            source: Arc::new(source),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SignalRClientError {
    fn from(source: tokio_tungstenite::tungstenite::Error) -> Self {
        SignalRClientError::WebSocket {
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for SignalRClientError {
    fn from(source: serde_json::Error) -> Self {
        SignalRClientError::Serialization {
            source: Arc::new(source),
        }
    }
}

impl From<url::ParseError> for SignalRClientError {
    fn from(error: url::ParseError) -> Self {
        SignalRClientError::InvalidUrl {
            reason: error.to_string(),
        }
    }
}
