//! Error types for tether.
//!
//! Most of this layer deliberately converts failures into `None`/`false` and a
//! logout callback. The variants here cover what still crosses an API
//! boundary: transport failures, refresh failures reported by a
//! [`TokenService`](crate::TokenService), storage backend failures and
//! invalid input.

use thiserror::Error;

/// The unified error type for tether operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network transport errors (DNS, TLS, connection, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (missing or rejected credentials).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Persistent storage errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation errors (URLs, header values, payloads).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// WebSocket protocol error.
    #[error("websocket error: {message}")]
    WebSocket { message: String },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential is stored for the service.
    #[error("no credential available for {service}")]
    MissingCredential { service: String },

    /// The refresh endpoint answered with a non-success status.
    #[error("refresh rejected with HTTP {status}")]
    RefreshRejected { status: u16 },

    /// The refresh response did not carry a new credential.
    #[error("refresh response missing field '{field}'")]
    MissingField { field: String },
}

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// The backing data could not be parsed.
    #[error("corrupt storage at {path}: {message}")]
    Corrupt { path: String, message: String },

    /// A lock guarding the storage was poisoned or could not be taken.
    #[error("storage lock unavailable: {message}")]
    Lock { message: String },
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid endpoint URL.
    #[error("invalid endpoint '{value}': {reason}")]
    Endpoint { value: String, reason: String },

    /// A header name or value that cannot be sent.
    #[error("invalid header '{name}': {reason}")]
    Header { name: String, reason: String },

    /// A body or message that could not be serialized.
    #[error("cannot serialize payload: {message}")]
    Payload { message: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(InvalidInputError::Payload {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_errors_render_with_category() {
        let err: Error = AuthError::RefreshRejected { status: 403 }.into();
        assert_eq!(
            err.to_string(),
            "authentication error: refresh rejected with HTTP 403"
        );

        let err: Error = TransportError::Timeout.into();
        assert_eq!(err.to_string(), "transport error: request timed out");
    }
}
