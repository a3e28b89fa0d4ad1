//! OCPP 1.6J message definitions
//!
//! Only the actions a simulated charge point sends or answers are modelled.
//! Response types are lenient about optional fields so that slightly
//! non-conforming central systems can still drive a session.

use crate::{OcppAction, OcppResponse};
use chrono::{DateTime, Utc};
use ocpp_types::{common::*, v16j::*, OcppError, OcppResult};
use serde::{Deserialize, Serialize};

fn require_non_empty(field: &str, value: &str) -> OcppResult<()> {
    if value.trim().is_empty() {
        return Err(OcppError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_connector(connector_id: u32) -> OcppResult<()> {
    if connector_id == 0 {
        return Err(OcppError::InvalidConnectorId(connector_id));
    }
    Ok(())
}

// =============================================================================
// Charge point initiated
// =============================================================================

/// Authorize request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    /// The identifier that needs to be authorized
    #[serde(rename = "idTag")]
    pub id_tag: String,
}

impl OcppAction for AuthorizeRequest {
    const ACTION_NAME: &'static str = "Authorize";
    type Response = AuthorizeResponse;

    fn validate(&self) -> OcppResult<()> {
        require_non_empty("idTag", &self.id_tag)
    }
}

/// Authorize response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    /// Authorization information
    #[serde(rename = "idTagInfo")]
    pub id_tag_info: IdTagInfo,
}

impl OcppResponse for AuthorizeResponse {}

/// BootNotification request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootNotificationRequest {
    /// Charge point vendor identification
    #[serde(rename = "chargePointVendor")]
    pub charge_point_vendor: String,
    /// Charge point model identification
    #[serde(rename = "chargePointModel")]
    pub charge_point_model: String,
    /// Charge point serial number (optional)
    #[serde(
        rename = "chargePointSerialNumber",
        skip_serializing_if = "Option::is_none"
    )]
    pub charge_point_serial_number: Option<String>,
    /// Charge box serial number (optional)
    #[serde(
        rename = "chargeBoxSerialNumber",
        skip_serializing_if = "Option::is_none"
    )]
    pub charge_box_serial_number: Option<String>,
    /// Firmware version (optional)
    #[serde(rename = "firmwareVersion", skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Meter type (optional)
    #[serde(rename = "meterType", skip_serializing_if = "Option::is_none")]
    pub meter_type: Option<String>,
    /// Meter serial number (optional)
    #[serde(rename = "meterSerialNumber", skip_serializing_if = "Option::is_none")]
    pub meter_serial_number: Option<String>,
}

impl OcppAction for BootNotificationRequest {
    const ACTION_NAME: &'static str = "BootNotification";
    type Response = BootNotificationResponse;

    fn validate(&self) -> OcppResult<()> {
        require_non_empty("chargePointVendor", &self.charge_point_vendor)?;
        require_non_empty("chargePointModel", &self.charge_point_model)
    }
}

/// BootNotification response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootNotificationResponse {
    /// Current time at central system
    #[serde(rename = "currentTime", default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<DateTime<Utc>>,
    /// Heartbeat interval in seconds
    #[serde(default)]
    pub interval: i32,
    /// Registration status
    pub status: RegistrationStatus,
}

impl OcppResponse for BootNotificationResponse {}

/// Registration status for BootNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RegistrationStatus {
    /// Charge point is accepted by central system
    Accepted,
    /// Charge point is not yet accepted
    Pending,
    /// Charge point is rejected by central system
    Rejected,
}

/// MeterValues request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterValuesRequest {
    /// Connector ID
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    /// Transaction ID (optional)
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    /// Meter values
    #[serde(rename = "meterValue")]
    pub meter_values: Vec<MeterValue>,
}

impl OcppAction for MeterValuesRequest {
    const ACTION_NAME: &'static str = "MeterValues";
    type Response = EmptyResponse;

    fn validate(&self) -> OcppResult<()> {
        if self.meter_values.is_empty() {
            return Err(OcppError::validation("meterValue must not be empty"));
        }
        Ok(())
    }
}

/// StartTransaction request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTransactionRequest {
    /// Connector ID
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    /// ID tag that started the transaction
    #[serde(rename = "idTag")]
    pub id_tag: String,
    /// Meter start value in Wh
    #[serde(rename = "meterStart")]
    pub meter_start: i64,
    /// Timestamp when transaction started
    pub timestamp: DateTime<Utc>,
    /// Optional reservation ID
    #[serde(rename = "reservationId", skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i32>,
}

impl OcppAction for StartTransactionRequest {
    const ACTION_NAME: &'static str = "StartTransaction";
    type Response = StartTransactionResponse;

    fn validate(&self) -> OcppResult<()> {
        require_connector(self.connector_id)?;
        require_non_empty("idTag", &self.id_tag)
    }
}

/// StartTransaction response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTransactionResponse {
    /// ID tag information
    #[serde(rename = "idTagInfo", default, skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
    /// Transaction ID assigned by the central system
    #[serde(rename = "transactionId", default)]
    pub transaction_id: Option<i32>,
}

impl OcppResponse for StartTransactionResponse {}

/// StatusNotification request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotificationRequest {
    /// Connector ID
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    /// Error code
    #[serde(rename = "errorCode")]
    pub error_code: ChargePointErrorCode,
    /// Current status
    pub status: ChargePointStatus,
    /// Timestamp of status change (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Additional information about the error (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl OcppAction for StatusNotificationRequest {
    const ACTION_NAME: &'static str = "StatusNotification";
    type Response = EmptyResponse;
}

/// StopTransaction request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTransactionRequest {
    /// ID tag that stopped the transaction (optional)
    #[serde(rename = "idTag", skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    /// Meter stop value in Wh
    #[serde(rename = "meterStop")]
    pub meter_stop: i64,
    /// Timestamp when transaction stopped
    pub timestamp: DateTime<Utc>,
    /// Transaction ID
    #[serde(rename = "transactionId")]
    pub transaction_id: i32,
    /// Reason for stopping (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl OcppAction for StopTransactionRequest {
    const ACTION_NAME: &'static str = "StopTransaction";
    type Response = StopTransactionResponse;
}

/// StopTransaction response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTransactionResponse {
    /// ID tag information (optional)
    #[serde(rename = "idTagInfo", default, skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

impl OcppResponse for StopTransactionResponse {}

/// Response carrying no fields (MeterValues, StatusNotification)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResponse {}

impl OcppResponse for EmptyResponse {}

// =============================================================================
// Central system initiated
// =============================================================================

/// GetConfiguration request message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConfigurationRequest {
    /// List of keys to retrieve (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<String>>,
}

impl OcppAction for GetConfigurationRequest {
    const ACTION_NAME: &'static str = "GetConfiguration";
    type Response = GetConfigurationResponse;
}

/// GetConfiguration response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetConfigurationResponse {
    /// Known configuration keys
    #[serde(rename = "configurationKey")]
    pub configuration_keys: Vec<KeyValue>,
    /// Requested keys that are not known
    #[serde(rename = "unknownKey")]
    pub unknown_keys: Vec<String>,
}

impl OcppResponse for GetConfigurationResponse {}

/// SetChargingProfile request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetChargingProfileRequest {
    /// Target connector
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    /// Profile to install
    #[serde(rename = "csChargingProfiles", alias = "chargingProfile")]
    pub cs_charging_profiles: ChargingProfile,
}

impl OcppAction for SetChargingProfileRequest {
    const ACTION_NAME: &'static str = "SetChargingProfile";
    type Response = SetChargingProfileResponse;
}

/// SetChargingProfile response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetChargingProfileResponse {
    pub status: ChargingProfileStatus,
}

impl OcppResponse for SetChargingProfileResponse {}

/// ClearChargingProfile request message; every field narrows the match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearChargingProfileRequest {
    /// Profile id
    #[serde(default, alias = "chargingProfileId", skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    /// Connector the profiles are installed on
    #[serde(rename = "connectorId", default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    /// Purpose of the profiles to clear
    #[serde(
        rename = "chargingProfilePurpose",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub charging_profile_purpose: Option<ChargingProfilePurposeType>,
    /// Stack level of the profiles to clear
    #[serde(rename = "stackLevel", default, skip_serializing_if = "Option::is_none")]
    pub stack_level: Option<u32>,
}

impl OcppAction for ClearChargingProfileRequest {
    const ACTION_NAME: &'static str = "ClearChargingProfile";
    type Response = ClearChargingProfileResponse;
}

/// ClearChargingProfile response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearChargingProfileResponse {
    pub status: ClearChargingProfileStatus,
}

impl OcppResponse for ClearChargingProfileResponse {}

/// GetCompositeSchedule request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetCompositeScheduleRequest {
    /// Connector to report
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    /// Length of the requested schedule in seconds
    pub duration: i64,
    /// Unit to report the schedule in (defaults to W)
    #[serde(
        rename = "chargingRateUnit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub charging_rate_unit: Option<ChargingRateUnitType>,
}

impl OcppAction for GetCompositeScheduleRequest {
    const ACTION_NAME: &'static str = "GetCompositeSchedule";
    type Response = GetCompositeScheduleResponse;
}

/// GetCompositeSchedule response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetCompositeScheduleResponse {
    pub status: GetCompositeScheduleStatus,
    #[serde(rename = "connectorId", skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    #[serde(rename = "scheduleStart", skip_serializing_if = "Option::is_none")]
    pub schedule_start: Option<DateTime<Utc>>,
    #[serde(rename = "chargingSchedule", skip_serializing_if = "Option::is_none")]
    pub charging_schedule: Option<ChargingSchedule>,
}

impl GetCompositeScheduleResponse {
    pub fn rejected() -> Self {
        Self {
            status: GetCompositeScheduleStatus::Rejected,
            connector_id: None,
            schedule_start: None,
            charging_schedule: None,
        }
    }
}

impl OcppResponse for GetCompositeScheduleResponse {}

/// Reset request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    /// Reset type
    #[serde(rename = "type")]
    pub reset_type: ResetType,
}

impl OcppAction for ResetRequest {
    const ACTION_NAME: &'static str = "Reset";
    type Response = ResetResponse;
}

/// Reset response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Status of reset
    pub status: ResetStatus,
}

impl OcppResponse for ResetResponse {}

/// Acknowledgement sent for any other central system request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericStatusResponse {
    pub status: String,
}

impl GenericStatusResponse {
    pub fn accepted() -> Self {
        Self {
            status: "Accepted".to_string(),
        }
    }
}

impl OcppResponse for GenericStatusResponse {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_boot_notification_payload() {
        let request = BootNotificationRequest {
            charge_point_vendor: "EVSE Simulator".to_string(),
            charge_point_model: "PerfAgent".to_string(),
            charge_point_serial_number: Some("CP-001".to_string()),
            charge_box_serial_number: Some("CP-001".to_string()),
            firmware_version: Some("perf".to_string()),
            meter_type: Some("AC".to_string()),
            meter_serial_number: Some("METER-CP-001".to_string()),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["chargePointVendor"], "EVSE Simulator");
        assert_eq!(value["chargeBoxSerialNumber"], "CP-001");
        assert_eq!(value["meterSerialNumber"], "METER-CP-001");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_boot_response_without_current_time() {
        let response: BootNotificationResponse =
            serde_json::from_value(json!({"status": "Pending"})).unwrap();
        assert_eq!(response.status, RegistrationStatus::Pending);
        assert_eq!(response.interval, 0);
        assert!(response.current_time.is_none());
    }

    #[test]
    fn test_start_transaction_response_null_transaction() {
        let response: StartTransactionResponse = serde_json::from_value(json!({
            "idTagInfo": {"status": "Accepted"},
            "transactionId": null
        }))
        .unwrap();
        assert!(response.transaction_id.is_none());
    }

    #[test]
    fn test_start_transaction_requires_connector() {
        let request = StartTransactionRequest {
            connector_id: 0,
            id_tag: "TAG".to_string(),
            meter_start: 0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            reservation_id: None,
        };
        assert!(matches!(
            request.validate(),
            Err(OcppError::InvalidConnectorId(0))
        ));
    }

    #[test]
    fn test_stop_transaction_payload() {
        let request = StopTransactionRequest {
            id_tag: None,
            meter_stop: 1530,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 20).unwrap(),
            transaction_id: 42,
            reason: Some(Reason::Local),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "meterStop": 1530,
                "timestamp": "2024-01-01T00:00:20Z",
                "transactionId": 42,
                "reason": "Local"
            })
        );
    }

    #[test]
    fn test_set_charging_profile_accepts_alias() {
        let request: SetChargingProfileRequest = serde_json::from_value(json!({
            "connectorId": 1,
            "chargingProfile": {
                "chargingProfileId": 3,
                "stackLevel": 1,
                "chargingProfilePurpose": "TxDefaultProfile",
                "chargingProfileKind": "Absolute",
                "chargingSchedule": {
                    "chargingRateUnit": "A",
                    "chargingSchedulePeriod": [{"startPeriod": 0, "limit": 16}]
                }
            }
        }))
        .unwrap();
        assert_eq!(request.cs_charging_profiles.charging_profile_id, 3);

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("csChargingProfiles").is_some());
    }

    #[test]
    fn test_clear_charging_profile_empty_request() {
        let request: ClearChargingProfileRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request, ClearChargingProfileRequest::default());
    }

    #[test]
    fn test_get_configuration_response_shape() {
        let response = GetConfigurationResponse {
            configuration_keys: vec![KeyValue {
                key: "HeartbeatInterval".to_string(),
                readonly: false,
                value: Some("300".to_string()),
            }],
            unknown_keys: vec![],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "configurationKey": [{"key": "HeartbeatInterval", "readonly": false, "value": "300"}],
                "unknownKey": []
            })
        );
    }

    #[test]
    fn test_composite_schedule_rejected_shape() {
        let value = serde_json::to_value(GetCompositeScheduleResponse::rejected()).unwrap();
        assert_eq!(value, json!({"status": "Rejected"}));
    }
}
