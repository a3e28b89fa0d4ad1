//! # Session Error Handling
//!
//! Errors raised while driving a simulated charge point through its OCPP
//! lifecycle. They stay local to the session; the load orchestrator only
//! ever sees the category through [`SessionEvent::Error`](crate::SessionEvent).

use ocpp_transport::TransportError;
use ocpp_types::OcppError;
use thiserror::Error;

/// Charge point session error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChargePointError {
    /// Could not reach the central system
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Transport failed after the connection was up
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Payload did not match the expected action
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Central system answered a CALL with a CALLERROR
    #[error("CallError on {action}: {code} - {description}")]
    CallError {
        action: String,
        code: String,
        description: String,
    },

    /// BootNotification was not accepted
    #[error("Boot notification rejected: {status}")]
    BootRejected { status: String },

    /// Authorize did not return Accepted
    #[error("Authorization failed for {id_tag}: {status}")]
    AuthorizationFailed { id_tag: String, status: String },

    /// StartTransaction returned no transaction or a refused id tag
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    /// A request stayed unanswered too long
    #[error("Timeout: {action} unanswered after {duration_ms}ms")]
    Timeout { action: String, duration_ms: u64 },

    /// Transition not allowed from the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ChargePointError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError(message.into())
    }

    pub fn call_error(
        action: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            action: action.into(),
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn boot_rejected(status: impl Into<String>) -> Self {
        Self::BootRejected {
            status: status.into(),
        }
    }

    pub fn authorization_failed(id_tag: impl Into<String>, status: impl Into<String>) -> Self {
        Self::AuthorizationFailed {
            id_tag: id_tag.into(),
            status: status.into(),
        }
    }

    pub fn transaction_rejected(message: impl Into<String>) -> Self {
        Self::TransactionRejected(message.into())
    }

    pub fn timeout(action: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            action: action.into(),
            duration_ms,
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Whether the session keeps running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::MalformedFrame(_)
            | Self::ProtocolViolation(_)
            | Self::CallError { .. }
            | Self::AuthorizationFailed { .. } => true,

            Self::ConnectionError(_)
            | Self::TransportError(_)
            | Self::BootRejected { .. }
            | Self::TransactionRejected(_)
            | Self::Timeout { .. }
            | Self::InvalidOperation(_)
            | Self::InternalError(_) => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionError(_) | Self::TransportError(_) => ErrorCategory::Network,
            Self::MalformedFrame(_) | Self::ProtocolViolation(_) | Self::CallError { .. } => {
                ErrorCategory::Protocol
            }
            Self::BootRejected { .. }
            | Self::AuthorizationFailed { .. }
            | Self::TransactionRejected(_) => ErrorCategory::Rejected,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::InvalidOperation(_) | Self::InternalError(_) => ErrorCategory::Logic,
        }
    }
}

impl From<TransportError> for ChargePointError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionError { .. }
            | TransportError::HandshakeError { .. }
            | TransportError::TlsError { .. } => Self::ConnectionError(err.to_string()),
            other => Self::TransportError(other.to_string()),
        }
    }
}

impl From<OcppError> for ChargePointError {
    fn from(err: OcppError) -> Self {
        match err {
            OcppError::MalformedFrame { message } | OcppError::Json { message } => {
                Self::MalformedFrame(message)
            }
            other => Self::ProtocolViolation(other.to_string()),
        }
    }
}

/// Error categories, the only error detail aggregated across sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Network,
    Protocol,
    Rejected,
    Timeout,
    Logic,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::Rejected => write!(f, "Rejected"),
            ErrorCategory::Timeout => write!(f, "Timeout"),
            ErrorCategory::Logic => write!(f, "Logic"),
        }
    }
}

/// Result type for charge point operations
pub type ChargePointResult<T> = Result<T, ChargePointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ChargePointError::call_error("BootNotification", "InternalError", "db down");
        assert_eq!(
            error.to_string(),
            "CallError on BootNotification: InternalError - db down"
        );
        assert!(error.is_recoverable());
        assert_eq!(error.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_rejections_end_the_session() {
        assert!(!ChargePointError::boot_rejected("Rejected").is_recoverable());
        assert!(!ChargePointError::transaction_rejected("no id").is_recoverable());
        assert!(ChargePointError::authorization_failed("TAG", "Blocked").is_recoverable());
    }

    #[test]
    fn test_conversions() {
        let err: ChargePointError = TransportError::connection("refused").into();
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(!err.is_recoverable());

        let err: ChargePointError = OcppError::malformed("short").into();
        assert!(matches!(err, ChargePointError::MalformedFrame(_)));
    }
}
