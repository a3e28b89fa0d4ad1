//! # OCPP Messages
//!
//! Typed payloads for the OCPP 1.6J actions the simulator exchanges with a
//! central system. Every request type implements [`OcppAction`], which ties it
//! to its action name and response type.

pub mod v16j;

pub use ocpp_types::{CallErrorMessage, CallMessage, CallResultMessage, Message, MessageType};
use ocpp_types::{OcppError, OcppResult};

pub use serde::{Deserialize, Serialize};

/// Action trait for OCPP messages
pub trait OcppAction: Serialize + for<'de> Deserialize<'de> + Send + Sync {
    /// Action name on the wire
    const ACTION_NAME: &'static str;
    /// The corresponding response type
    type Response: OcppResponse;

    /// Validate the message content
    fn validate(&self) -> OcppResult<()> {
        Ok(())
    }
}

/// Response trait for OCPP response messages
pub trait OcppResponse: Serialize + for<'de> Deserialize<'de> + Send + Sync {}

/// Utilities for working with OCPP messages
pub mod utils {
    use super::*;

    /// Create a validated Call message from an action
    pub fn create_call<T: OcppAction>(unique_id: impl Into<String>, action: &T) -> OcppResult<CallMessage> {
        action.validate()?;
        CallMessage::new(unique_id, T::ACTION_NAME, action)
    }

    /// Create a CallResult message from a response
    pub fn create_call_result<T: OcppResponse>(
        unique_id: impl Into<String>,
        response: &T,
    ) -> OcppResult<CallResultMessage> {
        CallResultMessage::new(unique_id, response)
    }

    /// Extract action payload from a Call message
    pub fn extract_payload<T: OcppAction>(call: &CallMessage) -> OcppResult<T> {
        if call.action != T::ACTION_NAME {
            return Err(OcppError::ProtocolViolation {
                message: format!(
                    "Expected action '{}', got '{}'",
                    T::ACTION_NAME,
                    call.action
                ),
            });
        }
        let payload: T = call.payload_as()?;
        payload.validate()?;
        Ok(payload)
    }

    /// Decode the response to a previously sent action
    pub fn extract_response<T: OcppAction>(result: &CallResultMessage) -> OcppResult<T::Response> {
        result.payload_as()
    }
}
