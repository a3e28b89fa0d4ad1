//! Profile validation errors

use thiserror::Error;

/// Reasons a charging profile is refused by the store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmartChargingError {
    /// Schedule has no periods
    #[error("charging schedule has no periods")]
    EmptySchedule,

    /// Period start offsets must strictly increase
    #[error("period {index} starts at {start}s, not after the previous period ({previous}s)")]
    NonIncreasingPeriods { index: usize, start: u32, previous: u32 },

    /// Negative or non-finite limit
    #[error("period {index} has invalid limit {limit}")]
    InvalidLimit { index: usize, limit: f64 },

    /// Negative or non-finite minimum charging rate
    #[error("invalid minChargingRate {rate}")]
    InvalidMinRate { rate: f64 },

    /// numberPhases outside 1..=3
    #[error("period {index} has invalid numberPhases {phases}")]
    InvalidPhases { index: usize, phases: u32 },

    /// validFrom is after validTo
    #[error("validity window is empty")]
    EmptyValidity,

    /// Payload could not be decoded into a profile
    #[error("invalid charging profile payload: {message}")]
    InvalidPayload { message: String },
}

impl From<serde_json::Error> for SmartChargingError {
    fn from(err: serde_json::Error) -> Self {
        SmartChargingError::InvalidPayload {
            message: err.to_string(),
        }
    }
}

pub type SmartChargingResult<T> = Result<T, SmartChargingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SmartChargingError::NonIncreasingPeriods {
            index: 2,
            start: 60,
            previous: 120,
        };
        assert_eq!(
            error.to_string(),
            "period 2 starts at 60s, not after the previous period (120s)"
        );
    }
}
