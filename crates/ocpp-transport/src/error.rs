//! Transport layer error types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Transport layer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// WebSocket connection error
    #[error("WebSocket connection error: {message}")]
    ConnectionError { message: String },

    /// WebSocket protocol error
    #[error("WebSocket protocol error: {message}")]
    ProtocolError { message: String },

    /// Message too large
    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// Connection timeout
    #[error("Connection timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Connection closed unexpectedly
    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// Server did not agree on the requested subprotocol
    #[error("Invalid subprotocol: {protocol}")]
    InvalidSubprotocol { protocol: String },

    /// IO error
    #[error("IO error: {message}")]
    IoError { message: String },

    /// TLS error
    #[error("TLS error: {message}")]
    TlsError { message: String },

    /// Handshake error
    #[error("WebSocket handshake error: {message}")]
    HandshakeError { message: String },

    /// Connection not ready
    #[error("Connection not ready, current state: {state:?}")]
    NotReady { state: crate::ConnectionState },

    /// Internal error
    #[error("Internal transport error: {message}")]
    Internal { message: String },
}

impl TransportError {
    pub fn connection(message: impl Into<String>) -> Self {
        TransportError::ConnectionError {
            message: message.into(),
        }
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        TransportError::ConnectionClosed {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<native_tls::Error> for TransportError {
    fn from(err: native_tls::Error) -> Self {
        TransportError::TlsError {
            message: err.to_string(),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed => TransportError::ConnectionClosed {
                reason: "WebSocket connection closed".to_string(),
            },
            tungstenite::Error::AlreadyClosed => TransportError::ConnectionClosed {
                reason: "WebSocket already closed".to_string(),
            },
            tungstenite::Error::Protocol(msg) => TransportError::ProtocolError {
                message: msg.to_string(),
            },
            tungstenite::Error::Io(io_err) => TransportError::IoError {
                message: io_err.to_string(),
            },
            tungstenite::Error::Tls(tls_err) => TransportError::TlsError {
                message: tls_err.to_string(),
            },
            tungstenite::Error::Http(response) => TransportError::HandshakeError {
                message: format!("server answered HTTP {}", response.status()),
            },
            tungstenite::Error::Url(url_err) => TransportError::ConnectionError {
                message: url_err.to_string(),
            },
            _ => TransportError::Internal {
                message: err.to_string(),
            },
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::MessageTooLarge {
            size: 100000,
            limit: 65536,
        };
        let message = error.to_string();
        assert!(message.contains("100000"));
        assert!(message.contains("65536"));
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused");

        match TransportError::from(io_error) {
            TransportError::IoError { message } => {
                assert!(message.contains("Connection refused"));
            }
            other => panic!("Expected IoError, got {other:?}"),
        }
    }

    #[test]
    fn test_error_conversion_from_tungstenite() {
        match TransportError::from(tungstenite::Error::ConnectionClosed) {
            TransportError::ConnectionClosed { reason } => {
                assert!(reason.contains("closed"));
            }
            other => panic!("Expected ConnectionClosed, got {other:?}"),
        }
    }
}
