//! # OCPP Types
//!
//! Foundational types for the OCPP 1.6J charge-point simulator: the frame
//! codec, error types, and the payload enums and records shared by the
//! message, smart-charging and session crates.

pub mod common;
pub mod error;
pub mod message;
pub mod v16j;

pub use error::*;
pub use message::*;

/// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// WebSocket subprotocol negotiated for OCPP 1.6J
pub const OCPP16_SUBPROTOCOL: &str = "ocpp1.6";

/// Message type identifier for OCPP messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = OcppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(MessageType::Call),
            3 => Ok(MessageType::CallResult),
            4 => Ok(MessageType::CallError),
            _ => Err(OcppError::InvalidMessageType(u64::from(value))),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(msg_type: MessageType) -> Self {
        msg_type as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::try_from(2).unwrap(), MessageType::Call);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::CallResult);
        assert_eq!(MessageType::try_from(4).unwrap(), MessageType::CallError);
        assert!(MessageType::try_from(1).is_err());
        assert!(MessageType::try_from(5).is_err());

        assert_eq!(u8::from(MessageType::Call), 2);
        assert_eq!(u8::from(MessageType::CallError), 4);
    }
}
