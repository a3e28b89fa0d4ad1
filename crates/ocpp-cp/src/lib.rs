//! # OCPP Charge Point Session
//!
//! A simulated OCPP 1.6J charge point that runs one scripted lifecycle
//! against a central system:
//! - BootNotification, Authorize and StartTransaction with duplicate guards
//! - periodic MeterValues capped by the smart-charging limit
//! - StopTransaction after the hold time, then close
//! - answers to server-initiated calls (configuration, charging profiles,
//!   composite schedules, reset)
//!
//! Each [`Session`] is driven by its own task; progress is reported on an
//! optional [`SessionEvent`] channel.

pub mod error;
pub mod message_handler;
pub mod meter;
pub mod session;
pub mod state_machine;

pub use error::{ChargePointError, ChargePointResult, ErrorCategory};
pub use session::{Session, SessionReport};
pub use state_machine::{SessionState, SessionStateMachine, SessionTrigger};

use ocpp_smart_charging::ConnectorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hold time used when the configured hold is zero
pub const DEFAULT_HOLD_SECS: u64 = 10;

/// Identity reported in BootNotification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootInfo {
    pub vendor: String,
    pub model: String,
    pub firmware_version: String,
    pub meter_type: String,
}

impl Default for BootInfo {
    fn default() -> Self {
        Self {
            vendor: "EVSE Simulator".to_string(),
            model: "PerfAgent".to_string(),
            firmware_version: "perf".to_string(),
            meter_type: "AC".to_string(),
        }
    }
}

/// Per-session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Central system URL the charge point id is appended to
    pub base_url: String,
    pub append_cp_id: bool,
    /// Seconds between StartTransaction and StopTransaction
    pub hold_secs: u64,
    /// Seconds between MeterValues, 0 disables them
    pub meter_interval_secs: u64,
    pub no_auth: bool,
    pub no_start: bool,
    pub no_stop: bool,
    /// Log full payloads instead of action names
    pub debug_payloads: bool,
    /// Send StatusNotification on boot, start and stop
    pub status_notifications: bool,
    /// Fail the session when a request stays unanswered this long
    pub response_timeout_secs: Option<u64>,
    /// CALLERRORs in a row on one action before the session gives up
    pub max_call_errors: u32,
    /// Delay between the final reply and closing the connection
    pub close_delay_ms: u64,
    pub nominal_power_w: f64,
    pub connector: ConnectorConfig,
    pub boot: BootInfo,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:9000/ocpp".to_string(),
            append_cp_id: true,
            hold_secs: 20,
            meter_interval_secs: 0,
            no_auth: false,
            no_start: false,
            no_stop: false,
            debug_payloads: false,
            status_notifications: false,
            response_timeout_secs: None,
            max_call_errors: 3,
            close_delay_ms: 200,
            nominal_power_w: 11_000.0,
            connector: ConnectorConfig::default(),
            boot: BootInfo::default(),
        }
    }
}

impl SessionConfig {
    pub fn hold(&self) -> Duration {
        let secs = if self.hold_secs == 0 {
            DEFAULT_HOLD_SECS
        } else {
            self.hold_secs
        };
        Duration::from_secs(secs)
    }

    pub fn meter_interval(&self) -> Option<Duration> {
        (self.meter_interval_secs > 0).then(|| Duration::from_secs(self.meter_interval_secs))
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }
}

/// Request/response round trips that are timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyPhase {
    Boot,
    Auth,
    Start,
    Stop,
}

impl LatencyPhase {
    pub fn for_action(action: &str) -> Option<Self> {
        match action {
            "BootNotification" => Some(LatencyPhase::Boot),
            "Authorize" => Some(LatencyPhase::Auth),
            "StartTransaction" => Some(LatencyPhase::Start),
            "StopTransaction" => Some(LatencyPhase::Stop),
            _ => None,
        }
    }
}

/// Progress notifications emitted by a session, at most once per occurrence
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session task started and is about to dial
    Launched { cp_id: String },
    /// Transport is open
    Connected { cp_id: String },
    /// A timed request was answered
    Latency { phase: LatencyPhase, millis: u64 },
    /// StartTransaction was accepted
    TransactionStarted { cp_id: String, transaction_id: i32 },
    /// Something went wrong; the session may or may not continue
    Error {
        cp_id: String,
        category: ErrorCategory,
    },
    /// The session reached a terminal state
    Finished {
        cp_id: String,
        state: SessionState,
        was_connected: bool,
    },
}
