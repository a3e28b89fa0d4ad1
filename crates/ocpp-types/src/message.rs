//! OCPP-J frame codec
//!
//! Frames are JSON arrays:
//! - CALL `[2, "<id>", "<Action>", {payload}]`
//! - CALLRESULT `[3, "<id>", {payload}]`
//! - CALLERROR `[4, "<id>", "<ErrorCode>", "<description>", {details}]`

use crate::{CallErrorCode, MessageType, OcppError, OcppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded OCPP frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Call message (request)
    Call(CallMessage),
    /// CallResult message (successful response)
    CallResult(CallResultMessage),
    /// CallError message (error response)
    CallError(CallErrorMessage),
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Call(_) => MessageType::Call,
            Message::CallResult(_) => MessageType::CallResult,
            Message::CallError(_) => MessageType::CallError,
        }
    }

    /// Get the unique message ID
    pub fn unique_id(&self) -> &str {
        match self {
            Message::Call(msg) => &msg.unique_id,
            Message::CallResult(msg) => &msg.unique_id,
            Message::CallError(msg) => &msg.unique_id,
        }
    }

    /// Create a new Call message
    pub fn call<T>(unique_id: impl Into<String>, action: impl Into<String>, payload: T) -> OcppResult<Self>
    where
        T: Serialize,
    {
        Ok(Message::Call(CallMessage::new(unique_id, action, payload)?))
    }

    /// Create a CallResult message in response to a Call
    pub fn call_result<T>(unique_id: impl Into<String>, payload: T) -> OcppResult<Self>
    where
        T: Serialize,
    {
        Ok(Message::CallResult(CallResultMessage::new(unique_id, payload)?))
    }

    /// Create a CallError message in response to a Call
    pub fn call_error(
        unique_id: impl Into<String>,
        error_code: CallErrorCode,
        error_description: impl Into<String>,
        error_details: Option<Value>,
    ) -> Self {
        Message::CallError(CallErrorMessage::new(
            unique_id,
            error_code,
            error_description,
            error_details,
        ))
    }

    /// Serialize into the wire array format
    pub fn encode(&self) -> OcppResult<String> {
        Ok(serde_json::to_string(&RawMessage::from(self.clone()))?)
    }

    /// Parse a text frame received from the peer
    pub fn decode(text: &str) -> OcppResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| OcppError::malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Validate and convert an already parsed JSON value
    pub fn from_value(value: Value) -> OcppResult<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(OcppError::malformed(format!(
                    "expected array frame, got {}",
                    json_kind(&other)
                )))
            }
        };

        let type_id = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| OcppError::malformed("missing numeric message type"))?;
        let message_type = u8::try_from(type_id)
            .map_err(|_| OcppError::InvalidMessageType(type_id))
            .and_then(MessageType::try_from)
            .map_err(|e| OcppError::malformed(e.to_string()))?;

        let min_len = match message_type {
            MessageType::Call => 4,
            MessageType::CallResult => 3,
            MessageType::CallError => 4,
        };
        if items.len() < min_len {
            return Err(OcppError::malformed(format!(
                "{:?} frame needs at least {} elements, got {}",
                message_type,
                min_len,
                items.len()
            )));
        }

        let mut items = items.into_iter().skip(1);
        let unique_id = take_string(&mut items, "message id")?;

        match message_type {
            MessageType::Call => {
                let action = take_string(&mut items, "action")?;
                let payload = items.next().unwrap_or(Value::Null);
                Ok(Message::Call(CallMessage {
                    unique_id,
                    action,
                    payload,
                }))
            }
            MessageType::CallResult => {
                let payload = items.next().unwrap_or(Value::Null);
                Ok(Message::CallResult(CallResultMessage { unique_id, payload }))
            }
            MessageType::CallError => {
                let code = take_string(&mut items, "error code")?;
                let error_description = take_string(&mut items, "error description")?;
                let error_details = items
                    .next()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                Ok(Message::CallError(CallErrorMessage {
                    unique_id,
                    error_code: CallErrorCode::from_wire(&code),
                    raw_error_code: code,
                    error_description,
                    error_details,
                }))
            }
        }
    }
}

fn take_string(items: &mut impl Iterator<Item = Value>, what: &str) -> OcppResult<String> {
    match items.next() {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(OcppError::malformed(format!(
            "{what} must be a string, got {}",
            json_kind(&other)
        ))),
        None => Err(OcppError::malformed(format!("missing {what}"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// OCPP Call message (request)
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage {
    /// Unique message identifier
    pub unique_id: String,
    /// Action name (e.g., "Authorize", "StartTransaction")
    pub action: String,
    /// Message payload
    pub payload: Value,
}

impl CallMessage {
    /// Create a new Call message
    pub fn new<T>(unique_id: impl Into<String>, action: impl Into<String>, payload: T) -> OcppResult<Self>
    where
        T: Serialize,
    {
        Ok(CallMessage {
            unique_id: unique_id.into(),
            action: action.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Extract the payload as a specific type
    pub fn payload_as<T>(&self) -> OcppResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// OCPP CallResult message (successful response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallResultMessage {
    /// Unique message identifier (same as corresponding Call)
    pub unique_id: String,
    /// Response payload
    pub payload: Value,
}

impl CallResultMessage {
    /// Create a new CallResult message
    pub fn new<T>(unique_id: impl Into<String>, payload: T) -> OcppResult<Self>
    where
        T: Serialize,
    {
        Ok(CallResultMessage {
            unique_id: unique_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Extract the payload as a specific type
    pub fn payload_as<T>(&self) -> OcppResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// OCPP CallError message (error response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallErrorMessage {
    /// Unique message identifier (same as corresponding Call)
    pub unique_id: String,
    /// Error code
    pub error_code: CallErrorCode,
    /// Error code exactly as received
    pub raw_error_code: String,
    /// Human-readable error description
    pub error_description: String,
    /// Additional error details
    pub error_details: Value,
}

impl CallErrorMessage {
    /// Create a new CallError message
    pub fn new(
        unique_id: impl Into<String>,
        error_code: CallErrorCode,
        error_description: impl Into<String>,
        error_details: Option<Value>,
    ) -> Self {
        CallErrorMessage {
            unique_id: unique_id.into(),
            error_code,
            raw_error_code: error_code.as_str().to_string(),
            error_description: error_description.into(),
            error_details: error_details.unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

/// Wire shape of a frame, used for encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMessage {
    /// Call message: [2, "unique_id", "action", payload]
    Call(u8, String, String, Value),
    /// CallResult message: [3, "unique_id", payload]
    CallResult(u8, String, Value),
    /// CallError message: [4, "unique_id", "error_code", "error_description", error_details]
    CallError(u8, String, String, String, Value),
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Call(msg) => RawMessage::Call(
                MessageType::Call.into(),
                msg.unique_id,
                msg.action,
                msg.payload,
            ),
            Message::CallResult(msg) => {
                RawMessage::CallResult(MessageType::CallResult.into(), msg.unique_id, msg.payload)
            }
            Message::CallError(msg) => RawMessage::CallError(
                MessageType::CallError.into(),
                msg.unique_id,
                msg.raw_error_code,
                msg.error_description,
                msg.error_details,
            ),
        }
    }
}
