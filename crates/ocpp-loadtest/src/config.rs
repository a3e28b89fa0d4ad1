//! # Load Test Configuration
//!
//! Run settings grouped by concern. A configuration is assembled from
//! defaults, an optional `.toml`/`.json` file, `OCPP_PERF_*` environment
//! variables and finally command line flags, then validated once.

use crate::error::{LoadTestError, LoadTestResult};
use crate::orchestrator::LoadPlan;
use crate::roster::{RosterFilter, DEFAULT_ID_TAG};
use ocpp_cp::{BootInfo, SessionConfig};
use ocpp_smart_charging::ConnectorConfig;
use ocpp_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables read by [`LoadTestConfig::apply_env_overrides`]
pub const ENV_PREFIX: &str = "OCPP_PERF_";

/// Main load test configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    pub target: TargetConfig,
    pub load: LoadConfig,
    pub session: SessionSettings,
    pub roster: RosterConfig,
    pub logging: LoggingConfig,
}

/// Central system to load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base WebSocket URL
    pub url: String,
    /// WebSocket sub-protocol
    pub sub_protocol: String,
    /// Append the charge point id to the URL path
    pub append_cp_id: bool,
    /// Accept invalid TLS certificates
    pub insecure: bool,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/ocpp".to_string(),
            sub_protocol: ocpp_types::OCPP16_SUBPROTOCOL.to_string(),
            append_cp_id: true,
            insecure: false,
            connect_timeout_secs: 30,
        }
    }
}

/// Shape of the load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Sessions to run, capped by the roster size
    pub total_sessions: usize,
    /// Sessions in flight at once
    pub max_concurrent: usize,
    /// Pause after each launch in milliseconds
    pub ramp_delay_ms: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            total_sessions: 1,
            max_concurrent: 1,
            ramp_delay_ms: 0,
        }
    }
}

/// What every session does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub hold_secs: u64,
    pub meter_interval_secs: u64,
    pub no_auth: bool,
    pub no_start: bool,
    pub no_stop: bool,
    pub debug_payloads: bool,
    pub status_notifications: bool,
    pub response_timeout_secs: Option<u64>,
    pub nominal_power_w: f64,
    pub connector: ConnectorConfig,
    pub boot: BootInfo,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            hold_secs: defaults.hold_secs,
            meter_interval_secs: defaults.meter_interval_secs,
            no_auth: defaults.no_auth,
            no_start: defaults.no_start,
            no_stop: defaults.no_stop,
            debug_payloads: defaults.debug_payloads,
            status_notifications: defaults.status_notifications,
            response_timeout_secs: defaults.response_timeout_secs,
            nominal_power_w: defaults.nominal_power_w,
            connector: defaults.connector,
            boot: defaults.boot,
        }
    }
}

/// Where charge point identities come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// CSV file with `cpId,idTag` rows
    pub csv_path: Option<PathBuf>,
    /// Regex on the charge point id
    pub grep: Option<String>,
    /// Rows to skip
    pub offset: usize,
    pub default_id_tag: String,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            grep: None,
            offset: 0,
            default_id_tag: DEFAULT_ID_TAG.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Pretty multi-line output instead of compact lines
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl LoadTestConfig {
    /// Load configuration from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> LoadTestResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(LoadTestError::configuration(format!(
                "Unsupported configuration file format for {}. Use .toml or .json",
                path.display()
            ))),
        }
    }

    /// Save configuration to a `.toml` or `.json` file
    pub fn to_file(&self, path: impl AsRef<Path>) -> LoadTestResult<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => toml::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `OCPP_PERF_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> LoadTestResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a full variable name such as
    /// `OCPP_PERF_URL` to its value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> LoadTestResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(url) = var("URL") {
            self.target.url = url;
        }
        if let Some(proto) = var("PROTO") {
            self.target.sub_protocol = proto;
        }
        if let Some(value) = var("INSECURE") {
            self.target.insecure = parse_flag("INSECURE", &value)?;
        }
        if let Some(value) = var("NO_APPEND_CP_ID") {
            self.target.append_cp_id = !parse_flag("NO_APPEND_CP_ID", &value)?;
        }
        if let Some(csv) = var("CSV") {
            self.roster.csv_path = Some(PathBuf::from(csv));
        }
        if let Some(grep) = var("GREP") {
            self.roster.grep = Some(grep);
        }
        if let Some(value) = var("OFFSET") {
            self.roster.offset = parse_number("OFFSET", &value)?;
        }
        if let Some(value) = var("TOTAL") {
            self.load.total_sessions = parse_number("TOTAL", &value)?;
        }
        if let Some(value) = var("CONCURRENT") {
            self.load.max_concurrent = parse_number("CONCURRENT", &value)?;
        }
        if let Some(value) = var("RAMP_MS") {
            self.load.ramp_delay_ms = parse_number("RAMP_MS", &value)?;
        }
        if let Some(value) = var("HOLD") {
            self.session.hold_secs = parse_number("HOLD", &value)?;
        }
        if let Some(value) = var("MV") {
            self.session.meter_interval_secs = parse_number("MV", &value)?;
        }
        if let Some(value) = var("NO_AUTH") {
            self.session.no_auth = parse_flag("NO_AUTH", &value)?;
        }
        if let Some(value) = var("NO_START") {
            self.session.no_start = parse_flag("NO_START", &value)?;
        }
        if let Some(value) = var("NO_STOP") {
            self.session.no_stop = parse_flag("NO_STOP", &value)?;
        }
        if let Some(value) = var("DEBUG") {
            self.session.debug_payloads = parse_flag("DEBUG", &value)?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> LoadTestResult<()> {
        if !self.target.url.starts_with("ws://") && !self.target.url.starts_with("wss://") {
            return Err(LoadTestError::validation(
                "target.url",
                format!("'{}' is not a ws:// or wss:// URL", self.target.url),
            ));
        }
        if self.target.sub_protocol.trim().is_empty() {
            return Err(LoadTestError::validation(
                "target.sub_protocol",
                "must not be empty",
            ));
        }
        if self.target.connect_timeout_secs == 0 {
            return Err(LoadTestError::validation(
                "target.connect_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.load.max_concurrent == 0 {
            return Err(LoadTestError::validation(
                "load.max_concurrent",
                "must be at least 1",
            ));
        }
        if self.session.nominal_power_w <= 0.0 {
            return Err(LoadTestError::validation(
                "session.nominal_power_w",
                "must be greater than 0",
            ));
        }
        let connector = &self.session.connector;
        if connector.voltage <= 0.0 || connector.phases == 0 || connector.max_power_w <= 0.0 {
            return Err(LoadTestError::validation(
                "session.connector",
                "voltage, phases and max_power_w must be positive",
            ));
        }
        if self.roster.default_id_tag.trim().is_empty() {
            return Err(LoadTestError::validation(
                "roster.default_id_tag",
                "must not be empty",
            ));
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connection_timeout: Duration::from_secs(self.target.connect_timeout_secs),
            sub_protocol: self.target.sub_protocol.clone(),
            accept_invalid_certs: self.target.insecure,
            ..TransportConfig::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let session = &self.session;
        SessionConfig {
            base_url: self.target.url.clone(),
            append_cp_id: self.target.append_cp_id,
            hold_secs: session.hold_secs,
            meter_interval_secs: session.meter_interval_secs,
            no_auth: session.no_auth,
            no_start: session.no_start,
            no_stop: session.no_stop,
            debug_payloads: session.debug_payloads,
            status_notifications: session.status_notifications,
            response_timeout_secs: session.response_timeout_secs,
            nominal_power_w: session.nominal_power_w,
            connector: session.connector,
            boot: session.boot.clone(),
            ..SessionConfig::default()
        }
    }

    pub fn roster_filter(&self) -> RosterFilter {
        RosterFilter {
            grep: self.roster.grep.clone(),
            offset: self.roster.offset,
            default_id_tag: Some(self.roster.default_id_tag.clone()),
        }
    }

    pub fn ramp_delay(&self) -> Duration {
        Duration::from_millis(self.load.ramp_delay_ms)
    }

    /// What the orchestrator should run
    pub fn load_plan(&self) -> LoadPlan {
        LoadPlan {
            total_sessions: self.load.total_sessions,
            max_concurrent: self.load.max_concurrent,
            ramp_delay: self.ramp_delay(),
            session: self.session_config(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> LoadTestResult<T> {
    value.trim().parse().map_err(|_| {
        LoadTestError::validation(
            format!("{ENV_PREFIX}{name}"),
            format!("'{}' is not a valid number", value),
        )
    })
}

fn parse_flag(name: &str, value: &str) -> LoadTestResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(LoadTestError::validation(
            format!("{ENV_PREFIX}{name}"),
            format!("'{}' is not a boolean", other),
        )),
    }
}
