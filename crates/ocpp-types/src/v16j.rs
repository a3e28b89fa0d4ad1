//! OCPP 1.6J specific types and enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Charge point status enumeration for OCPP 1.6J
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargePointStatus {
    /// Available for new transaction
    Available,
    /// Preparing for transaction
    Preparing,
    /// Charging in progress
    Charging,
    /// SuspendedEV - charging suspended by EV
    SuspendedEV,
    /// SuspendedEVSE - charging suspended by EVSE
    SuspendedEVSE,
    /// Transaction finished, connector not yet released
    Finishing,
    /// Reserved for specific user
    Reserved,
    /// Out of order
    Faulted,
    /// Unavailable due to local action
    Unavailable,
}

/// Error code enumeration for OCPP 1.6J
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargePointErrorCode {
    ConnectorLockFailure,
    EVCommunicationError,
    GroundFailure,
    HighTemperature,
    InternalError,
    NoError,
    OtherError,
    OverCurrentFailure,
    OverVoltage,
    PowerMeterFailure,
    UnderVoltage,
}

/// Reset type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResetType {
    /// Hard reset (reboot)
    Hard,
    /// Soft reset (restart software)
    Soft,
}

/// Reset status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResetStatus {
    Accepted,
    Rejected,
}

/// Charging profile purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingProfilePurposeType {
    /// Hardware ceiling for the whole charge point
    ChargePointMaxProfile,
    /// Default limit applied to new transactions
    TxDefaultProfile,
    /// Override for the running transaction
    #[default]
    TxProfile,
}

impl ChargingProfilePurposeType {
    /// Ordering weight when several purposes compete; higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            ChargingProfilePurposeType::TxProfile => 3,
            ChargingProfilePurposeType::TxDefaultProfile => 2,
            ChargingProfilePurposeType::ChargePointMaxProfile => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargingProfilePurposeType::ChargePointMaxProfile => "ChargePointMaxProfile",
            ChargingProfilePurposeType::TxDefaultProfile => "TxDefaultProfile",
            ChargingProfilePurposeType::TxProfile => "TxProfile",
        }
    }
}

impl std::fmt::Display for ChargingProfilePurposeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Charging profile kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingProfileKindType {
    /// Schedule periods are relative to a fixed point in time
    #[default]
    Absolute,
    /// Schedule restarts periodically
    Recurring,
    /// Schedule periods are relative to the transaction start
    Relative,
}

/// Recurrency kind for charging profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RecurrencyKindType {
    /// Daily recurrence
    Daily,
    /// Weekly recurrence, aligned on Monday
    Weekly,
}

/// Charging schedule period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSchedulePeriod {
    /// Start period offset in seconds from start of schedule
    #[serde(rename = "startPeriod", default)]
    pub start_period: u32,
    /// Limit expressed in the schedule's rate unit
    pub limit: f64,
    /// Number of phases (optional)
    #[serde(rename = "numberPhases", skip_serializing_if = "Option::is_none")]
    pub number_phases: Option<u32>,
}

impl ChargingSchedulePeriod {
    pub fn new(start_period: u32, limit: f64) -> Self {
        Self {
            start_period,
            limit,
            number_phases: None,
        }
    }
}

/// Charging schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSchedule {
    /// Duration in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Start schedule timestamp (optional)
    #[serde(rename = "startSchedule", skip_serializing_if = "Option::is_none")]
    pub start_schedule: Option<DateTime<Utc>>,
    /// Charging rate unit
    #[serde(rename = "chargingRateUnit", default)]
    pub charging_rate_unit: ChargingRateUnitType,
    /// Charging schedule periods
    #[serde(rename = "chargingSchedulePeriod", default)]
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
    /// Minimum charging rate (optional)
    #[serde(rename = "minChargingRate", skip_serializing_if = "Option::is_none")]
    pub min_charging_rate: Option<f64>,
}

/// Charging rate unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChargingRateUnitType {
    /// Watts
    #[default]
    W,
    /// Amperes
    A,
}

/// Charging profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingProfile {
    /// Unique identifier
    #[serde(rename = "chargingProfileId")]
    pub charging_profile_id: i32,
    /// Transaction ID (for TxProfile only, optional)
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    /// Stack level (for priority within a purpose)
    #[serde(rename = "stackLevel", default)]
    pub stack_level: u32,
    /// Purpose of the profile
    #[serde(rename = "chargingProfilePurpose", default)]
    pub charging_profile_purpose: ChargingProfilePurposeType,
    /// Kind of profile
    #[serde(rename = "chargingProfileKind", default)]
    pub charging_profile_kind: ChargingProfileKindType,
    /// Recurrency kind (optional)
    #[serde(rename = "recurrencyKind", skip_serializing_if = "Option::is_none")]
    pub recurrency_kind: Option<RecurrencyKindType>,
    /// Valid from timestamp (optional)
    #[serde(rename = "validFrom", skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// Valid to timestamp (optional)
    #[serde(rename = "validTo", skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Charging schedule
    #[serde(rename = "chargingSchedule")]
    pub charging_schedule: ChargingSchedule,
}

/// Charging profile status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChargingProfileStatus {
    Accepted,
    Rejected,
    NotSupported,
}

/// Clear charging profile status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ClearChargingProfileStatus {
    /// At least one profile was removed
    Accepted,
    /// Nothing matched
    Unknown,
}

/// Get composite schedule status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GetCompositeScheduleStatus {
    Accepted,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_charge_point_status_serialization() {
        let json = serde_json::to_string(&ChargePointStatus::Finishing).unwrap();
        assert_eq!(json, "\"Finishing\"");
    }

    #[test]
    fn test_purpose_priority_order() {
        assert!(
            ChargingProfilePurposeType::TxProfile.priority()
                > ChargingProfilePurposeType::TxDefaultProfile.priority()
        );
        assert!(
            ChargingProfilePurposeType::TxDefaultProfile.priority()
                > ChargingProfilePurposeType::ChargePointMaxProfile.priority()
        );
    }

    #[test]
    fn test_charging_profile_wire_format() {
        let profile = ChargingProfile {
            charging_profile_id: 7,
            transaction_id: None,
            stack_level: 2,
            charging_profile_purpose: ChargingProfilePurposeType::TxDefaultProfile,
            charging_profile_kind: ChargingProfileKindType::Recurring,
            recurrency_kind: Some(RecurrencyKindType::Daily),
            valid_from: None,
            valid_to: None,
            charging_schedule: ChargingSchedule {
                duration: Some(3600),
                start_schedule: Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()),
                charging_rate_unit: ChargingRateUnitType::A,
                charging_schedule_period: vec![ChargingSchedulePeriod {
                    start_period: 0,
                    limit: 16.0,
                    number_phases: Some(3),
                }],
                min_charging_rate: None,
            },
        };

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["chargingProfileId"], 7);
        assert_eq!(value["chargingProfilePurpose"], "TxDefaultProfile");
        assert_eq!(value["recurrencyKind"], "Daily");
        assert_eq!(value["chargingSchedule"]["chargingRateUnit"], "A");
        assert_eq!(
            value["chargingSchedule"]["chargingSchedulePeriod"][0]["numberPhases"],
            3
        );
        assert!(value.get("transactionId").is_none());
    }

    #[test]
    fn test_charging_profile_defaults_when_fields_missing() {
        let profile: ChargingProfile = serde_json::from_value(json!({
            "chargingProfileId": 1,
            "chargingSchedule": {
                "chargingSchedulePeriod": [{"startPeriod": 0, "limit": 7400}]
            }
        }))
        .unwrap();

        assert_eq!(profile.stack_level, 0);
        assert_eq!(
            profile.charging_profile_purpose,
            ChargingProfilePurposeType::TxProfile
        );
        assert_eq!(
            profile.charging_profile_kind,
            ChargingProfileKindType::Absolute
        );
        assert_eq!(
            profile.charging_schedule.charging_rate_unit,
            ChargingRateUnitType::W
        );
    }

    #[test]
    fn test_negative_start_period_is_rejected_by_decoder() {
        let result: Result<ChargingSchedulePeriod, _> =
            serde_json::from_value(json!({"startPeriod": -5, "limit": 10.0}));
        assert!(result.is_err());
    }
}
