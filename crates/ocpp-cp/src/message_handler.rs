//! # Inbound Call Handling
//!
//! Answers the CALLs a central system sends to the simulated charge point.
//! Smart-charging calls go to the session's [`ChargingProfileStore`]; every
//! other recognised action is acknowledged with `{status: Accepted}`.

use chrono::{DateTime, Utc};
use ocpp_messages::utils::{create_call_result, extract_payload};
use ocpp_messages::v16j::{
    ClearChargingProfileRequest, ClearChargingProfileResponse, GenericStatusResponse,
    GetCompositeScheduleRequest, GetConfigurationRequest, GetConfigurationResponse, ResetRequest,
    ResetResponse, SetChargingProfileRequest, SetChargingProfileResponse,
};
use ocpp_messages::{CallMessage, Message, OcppAction, OcppResponse};
use ocpp_smart_charging::profile::{charging_connector, parse_set_charging_profile};
use ocpp_smart_charging::{composite_schedule, ChargingProfileStore, ClearCriteria};
use ocpp_types::common::KeyValue;
use ocpp_types::v16j::{ChargingProfileStatus, ResetStatus};
use ocpp_types::{CallErrorCode, OcppError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
struct ConfigEntry {
    value: String,
    readonly: bool,
}

/// Configuration keys reported through GetConfiguration
#[derive(Debug, Clone)]
pub struct ConfigurationStore {
    keys: BTreeMap<String, ConfigEntry>,
}

impl ConfigurationStore {
    /// Keys of the simulated charge point; the meter interval is reported as
    /// configured for the session
    pub fn new(meter_interval_secs: u64) -> Self {
        let mut store = Self {
            keys: BTreeMap::new(),
        };
        store.insert("HeartbeatInterval", "300", false);
        store.insert(
            "MeterValueSampleInterval",
            &meter_interval_secs.to_string(),
            false,
        );
        store.insert("NumberOfConnectors", "1", true);
        store
    }

    fn insert(&mut self, key: &str, value: &str, readonly: bool) {
        self.keys.insert(
            key.to_string(),
            ConfigEntry {
                value: value.to_string(),
                readonly,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(|entry| entry.value.as_str())
    }

    fn key_value(&self, key: &str) -> Option<KeyValue> {
        self.keys.get(key).map(|entry| KeyValue {
            key: key.to_string(),
            readonly: entry.readonly,
            value: Some(entry.value.clone()),
        })
    }

    /// Build the GetConfiguration answer; no key list means every key
    pub fn get_configuration(&self, request: &GetConfigurationRequest) -> GetConfigurationResponse {
        match request.key.as_deref() {
            None | Some([]) => GetConfigurationResponse {
                configuration_keys: self.keys.keys().filter_map(|k| self.key_value(k)).collect(),
                unknown_keys: Vec::new(),
            },
            Some(requested) => {
                let mut configuration_keys = Vec::new();
                let mut unknown_keys = Vec::new();
                for key in requested {
                    match self.key_value(key) {
                        Some(kv) => configuration_keys.push(kv),
                        None => unknown_keys.push(key.clone()),
                    }
                }
                GetConfigurationResponse {
                    configuration_keys,
                    unknown_keys,
                }
            }
        }
    }
}

/// Something the session must do after the reply went out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Close the connection after the delay
    CloseAfter(Duration),
}

/// Reply frame plus any follow-up
#[derive(Debug, Clone, PartialEq)]
pub struct HandledCall {
    pub response: Message,
    pub follow_up: Option<FollowUp>,
}

impl HandledCall {
    fn reply(response: Message) -> Self {
        Self {
            response,
            follow_up: None,
        }
    }
}

/// Dispatches server-initiated CALLs
#[derive(Debug, Clone)]
pub struct CallHandler {
    config: ConfigurationStore,
    reset_delay: Duration,
}

impl CallHandler {
    pub fn new(config: ConfigurationStore, reset_delay: Duration) -> Self {
        Self {
            config,
            reset_delay,
        }
    }

    pub fn configuration(&self) -> &ConfigurationStore {
        &self.config
    }

    /// Answer `call`. Payloads that do not decode are answered with a
    /// CALLERROR; the session keeps running either way.
    pub fn handle(
        &mut self,
        call: &CallMessage,
        store: &mut ChargingProfileStore,
        now: DateTime<Utc>,
    ) -> HandledCall {
        let result = match call.action.as_str() {
            GetConfigurationRequest::ACTION_NAME => self.get_configuration(call),
            SetChargingProfileRequest::ACTION_NAME => set_charging_profile(call, store, now),
            ClearChargingProfileRequest::ACTION_NAME => clear_charging_profile(call, store, now),
            GetCompositeScheduleRequest::ACTION_NAME => get_composite_schedule(call, store, now),
            ResetRequest::ACTION_NAME => self.reset(call),
            other => {
                debug!("Acknowledging {} with Accepted", other);
                reply(call, &GenericStatusResponse::accepted()).map(HandledCall::reply)
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Cannot process {} ({}): {}", call.action, call.unique_id, e);
            let code = match e {
                OcppError::Json { .. } | OcppError::ValidationError { .. } => {
                    CallErrorCode::FormationViolation
                }
                _ => CallErrorCode::InternalError,
            };
            HandledCall::reply(Message::call_error(
                call.unique_id.clone(),
                code,
                e.to_string(),
                None,
            ))
        })
    }

    fn get_configuration(&self, call: &CallMessage) -> Result<HandledCall, OcppError> {
        let request: GetConfigurationRequest = extract_payload(call)?;
        let response = self.config.get_configuration(&request);
        debug!(
            "GetConfiguration: {} keys, {} unknown",
            response.configuration_keys.len(),
            response.unknown_keys.len()
        );
        reply(call, &response).map(HandledCall::reply)
    }

    fn reset(&self, call: &CallMessage) -> Result<HandledCall, OcppError> {
        let request: ResetRequest = extract_payload(call)?;
        info!("Reset ({:?}) accepted, closing", request.reset_type);
        let response = reply(
            call,
            &ResetResponse {
                status: ResetStatus::Accepted,
            },
        )?;
        Ok(HandledCall {
            response,
            follow_up: Some(FollowUp::CloseAfter(self.reset_delay)),
        })
    }
}

/// Only a payload without a usable `connectorId` is a CALLERROR; a profile
/// that does not decode or validate is answered `Rejected`.
fn set_charging_profile(
    call: &CallMessage,
    store: &mut ChargingProfileStore,
    now: DateTime<Utc>,
) -> Result<HandledCall, OcppError> {
    let connector_id = call
        .payload
        .get("connectorId")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| OcppError::validation("connectorId is missing or not a connector number"))?;

    let status = match parse_set_charging_profile(&call.payload) {
        Ok((connector, profile)) => store.install(connector, profile, now),
        Err(e) => {
            warn!(
                "Rejected charging profile for connector {} ({}): {}",
                connector_id, call.unique_id, e
            );
            ChargingProfileStatus::Rejected
        }
    };
    reply(call, &SetChargingProfileResponse { status }).map(HandledCall::reply)
}

fn clear_charging_profile(
    call: &CallMessage,
    store: &mut ChargingProfileStore,
    now: DateTime<Utc>,
) -> Result<HandledCall, OcppError> {
    let request: ClearChargingProfileRequest = extract_payload(call)?;
    let outcome = store.clear(&ClearCriteria::from(&request), now);
    reply(
        call,
        &ClearChargingProfileResponse {
            status: outcome.status,
        },
    )
    .map(HandledCall::reply)
}

fn get_composite_schedule(
    call: &CallMessage,
    store: &mut ChargingProfileStore,
    now: DateTime<Utc>,
) -> Result<HandledCall, OcppError> {
    let request: GetCompositeScheduleRequest = extract_payload(call)?;
    let response = composite_schedule(
        store,
        charging_connector(request.connector_id),
        request.duration,
        request.charging_rate_unit,
        now,
    );
    reply(call, &response).map(HandledCall::reply)
}

fn reply<T: OcppResponse>(call: &CallMessage, response: &T) -> Result<Message, OcppError> {
    Ok(Message::CallResult(create_call_result(
        call.unique_id.clone(),
        response,
    )?))
}
