//! Error types for OCPP operations

use thiserror::Error;

/// Main error type for OCPP framing and payload handling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcppError {
    /// Invalid message type identifier
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u64),

    /// Invalid connector ID (must be > 0)
    #[error("Invalid connector ID: {0} (must be > 0)")]
    InvalidConnectorId(u32),

    /// Frame could not be decoded into a CALL, CALLRESULT or CALLERROR
    #[error("Malformed frame: {message}")]
    MalformedFrame { message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Protocol violation
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// Message validation error
    #[error("Message validation error: {message}")]
    ValidationError { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl OcppError {
    pub fn malformed(message: impl Into<String>) -> Self {
        OcppError::MalformedFrame {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        OcppError::ValidationError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for OcppError {
    fn from(err: serde_json::Error) -> Self {
        OcppError::Json {
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for OcppError {
    fn from(err: anyhow::Error) -> Self {
        OcppError::Internal {
            message: err.to_string(),
        }
    }
}

/// OCPP Call Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CallErrorCode {
    /// Requested Action is not known by receiver
    NotImplemented,

    /// Requested Action is recognized but not supported by the receiver
    NotSupported,

    /// An internal error occurred and the receiver was not able to process the requested Action successfully
    InternalError,

    /// Payload for Action is incomplete
    ProtocolError,

    /// During the processing of Action a security issue occurred preventing receiver from completing the Action successfully
    SecurityError,

    /// Payload for Action is syntactically incorrect or not conform the PDU structure for Action
    FormationViolation,

    /// Payload is syntactically correct but at least one field contains an invalid value
    PropertyConstraintViolation,

    /// Payload for Action is syntactically correct but at least one of the fields violates occurrence constraints
    OccurrenceConstraintViolation,

    /// Payload for Action is syntactically correct but at least one of the fields violates data type constraints (e.g. "somestring": 12)
    TypeConstraintViolation,

    /// Any other error not covered by the above
    GenericError,
}

impl std::fmt::Display for CallErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallErrorCode {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CallErrorCode::NotImplemented => "NotImplemented",
            CallErrorCode::NotSupported => "NotSupported",
            CallErrorCode::InternalError => "InternalError",
            CallErrorCode::ProtocolError => "ProtocolError",
            CallErrorCode::SecurityError => "SecurityError",
            CallErrorCode::FormationViolation => "FormationViolation",
            CallErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            CallErrorCode::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            CallErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
            CallErrorCode::GenericError => "GenericError",
        }
    }

    /// Maps a received error code. OCPP 1.6 spells one code
    /// `OccurenceConstraintViolation`; both spellings are accepted and
    /// anything unrecognised becomes `GenericError`.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "NotImplemented" => CallErrorCode::NotImplemented,
            "NotSupported" => CallErrorCode::NotSupported,
            "InternalError" => CallErrorCode::InternalError,
            "ProtocolError" => CallErrorCode::ProtocolError,
            "SecurityError" => CallErrorCode::SecurityError,
            "FormationViolation" => CallErrorCode::FormationViolation,
            "PropertyConstraintViolation" => CallErrorCode::PropertyConstraintViolation,
            "OccurrenceConstraintViolation" | "OccurenceConstraintViolation" => {
                CallErrorCode::OccurrenceConstraintViolation
            }
            "TypeConstraintViolation" => CallErrorCode::TypeConstraintViolation,
            _ => CallErrorCode::GenericError,
        }
    }
}

/// Result type alias for OCPP operations
pub type OcppResult<T> = Result<T, OcppError>;
