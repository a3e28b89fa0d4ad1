//! # OCPP Smart Charging
//!
//! Resolves the power limit that applies to a connector from the charging
//! profiles installed by the central system.
//!
//! - [`evaluator`] turns one profile into a limit at a given instant
//! - [`ChargingProfileStore`] holds profiles per connector, applies the
//!   install/clear rules and picks the effective limit
//! - [`composite`] flattens the effective limit over a time window
//! - [`timers`] wakes the owner when a period boundary is crossed

pub mod composite;
pub mod error;
pub mod evaluator;
pub mod profile;
pub mod store;
pub mod timers;

pub use composite::composite_schedule;
pub use error::{SmartChargingError, SmartChargingResult};
pub use evaluator::{evaluate, Evaluation};
pub use store::{ChargingProfileStore, ClearCriteria, ClearOutcome};

use chrono::{DateTime, Utc};
use ocpp_types::v16j::ChargingProfilePurposeType;
use serde::{Deserialize, Serialize};

/// Electrical characteristics of a connector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Line voltage used to convert amps to watts
    pub voltage: f64,
    /// Phases in use when a period does not say otherwise
    pub phases: u32,
    /// Physical ceiling in watts
    pub max_power_w: f64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            voltage: 230.0,
            phases: 1,
            max_power_w: 22_000.0,
        }
    }
}

/// Where an effective limit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitSource {
    /// An installed profile applies
    Profile,
    /// No profile applies, the connector maximum is used
    Physical,
    /// The connector has never been configured
    Default,
}

/// Limit in force on a connector at `computed_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveLimit {
    pub limit_w: f64,
    pub source: LimitSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<ChargingProfilePurposeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_level: Option<u32>,
    pub computed_at: DateTime<Utc>,
    /// Seconds until the limit may change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_change_in_sec: Option<u64>,
}

impl EffectiveLimit {
    fn fallback(limit_w: f64, source: LimitSource, now: DateTime<Utc>) -> Self {
        Self {
            limit_w,
            source,
            profile_id: None,
            purpose: None,
            stack_level: None,
            computed_at: now,
            next_change_in_sec: None,
        }
    }
}
