//! # OCPP Load Test
//!
//! Drives many simulated charge points against one central system:
//!
//! - Roster loading from CSV with regex filtering and offset
//! - Layered configuration (file, environment, command line)
//! - Bounded-concurrency launching with a ramp delay
//! - Live counters and latency averages
//! - Graceful stop of every running session

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod roster;
pub mod stats;

pub use config::LoadTestConfig;
pub use error::{LoadTestError, LoadTestResult};
pub use orchestrator::{LiveSession, LoadOrchestrator, LoadOutcome, LoadPlan};
pub use roster::{load_roster, parse_roster, RosterEntry, RosterFilter, DEFAULT_ID_TAG};
pub use stats::{LatencySummary, LoadStats, StatsSnapshot};
