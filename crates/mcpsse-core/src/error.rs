//! Error types for the SSE transport.
//!
//! None of these errors are fatal to a running session. The reader and sender
//! tasks log them and carry on; they only surface directly from the
//! construction APIs (`TransportSession::new`, `open`) and from envelope
//! parsing.

use thiserror::Error;

/// Failure to decode a JSON-RPC envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("JSON-RPC message must be an object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Conflicting fields: {0} and {1}")]
    ConflictingFields(&'static str, &'static str),

    #[error("Invalid field {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl ParseError {
    /// Name of the offending field, if the error is about a specific one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ParseError::MissingField(field) => Some(*field),
            ParseError::ConflictingFields(field, _) => Some(*field),
            ParseError::InvalidField { field, .. } => Some(*field),
            ParseError::InvalidJson(_) | ParseError::NotAnObject => None,
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::InvalidJson(err.to_string())
    }
}

/// Main error type for the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        /// HTTP status, when the server answered with a non-success code.
        status: Option<u16>,
    },

    #[error("Handshake failed, expected endpoint announcement but got {line:?}")]
    Handshake { line: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Session is {actual}, expected {expected}")]
    SessionState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Connection {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Parse(err.into())
    }
}

impl TransportError {
    /// Build a connection error from a message.
    pub fn connection(message: impl Into<String>) -> Self {
        TransportError::Connection {
            message: message.into(),
            status: None,
        }
    }

    /// Build an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, err: url::ParseError) -> Self {
        TransportError::InvalidUrl {
            url: url.into(),
            message: err.to_string(),
        }
    }
}
