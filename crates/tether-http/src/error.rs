//! Conversions from transport library errors.

use tether_core::error::{Error, TransportError};

/// Map a reqwest failure onto the tether transport taxonomy.
pub(crate) fn from_reqwest(err: reqwest::Error) -> Error {
    let transport = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    Error::Transport(transport)
}

/// Map a WebSocket failure onto the tether transport taxonomy.
pub(crate) fn from_websocket(err: tokio_tungstenite::tungstenite::Error) -> Error {
    Error::Transport(TransportError::WebSocket {
        message: err.to_string(),
    })
}
