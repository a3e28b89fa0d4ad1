//! # Load Test Error Handling
//!
//! Errors raised while preparing or supervising a load run. Session failures
//! never surface here; they only show up in the aggregated counters.

use std::path::Path;
use thiserror::Error;

/// Load test error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadTestError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid value for a configuration field
    #[error("Validation error: {field} - {message}")]
    ValidationError { field: String, message: String },

    /// Roster file could not be read or parsed
    #[error("Roster error: {path} - {message}")]
    RosterError { path: String, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Operation not allowed in the current state
    #[error("Invalid state for operation: {0}")]
    InvalidStateError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LoadTestError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn roster(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::RosterError {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidStateError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Whether the run can go on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidStateError(_))
    }
}

impl From<std::io::Error> for LoadTestError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for LoadTestError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for LoadTestError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<toml::ser::Error> for LoadTestError {
    fn from(err: toml::ser::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LoadTestError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError(format!("task failed: {}", err))
    }
}

/// Result type for load test operations
pub type LoadTestResult<T> = Result<T, LoadTestError>;
