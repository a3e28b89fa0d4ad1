//! # Run Statistics
//!
//! Counters and latency averages folded from [`SessionEvent`]s. Only the
//! aggregator task mutates [`LoadStats`]; everybody else reads
//! [`StatsSnapshot`]s.

use ocpp_cp::{ErrorCategory, LatencyPhase, SessionEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: u64,
    count: u64,
}

impl Mean {
    fn add(&mut self, value: u64) {
        self.sum += value;
        self.count += 1;
    }

    fn rounded(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        (self.sum as f64 / self.count as f64).round() as u64
    }
}

/// Mean request latency per phase, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub boot: u64,
    pub auth: u64,
    pub start: u64,
    pub stop: u64,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Sessions planned for the run
    pub total: usize,
    pub launched: u64,
    pub active: u64,
    pub started_tx: u64,
    pub closed: u64,
    pub errors: u64,
    /// Highest number of simultaneously active sessions
    pub peak: u64,
    pub avg_latency_ms: LatencySummary,
}

impl StatsSnapshot {
    /// Every planned session has finished
    pub fn is_complete(&self) -> bool {
        self.closed as usize >= self.total
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Launched:{} Active:{} StartedTx:{} Closed:{} Errors:{} | avg boot:{}ms auth:{}ms start:{}ms stop:{}ms",
            self.launched,
            self.active,
            self.started_tx,
            self.closed,
            self.errors,
            self.avg_latency_ms.boot,
            self.avg_latency_ms.auth,
            self.avg_latency_ms.start,
            self.avg_latency_ms.stop
        )
    }
}

/// Mutable aggregate of a run
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    total: usize,
    launched: u64,
    active: u64,
    started_tx: u64,
    closed: u64,
    errors: u64,
    peak: u64,
    latency: HashMap<LatencyPhase, Mean>,
    errors_by_category: HashMap<ErrorCategory, u64>,
}

impl LoadStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Fold one session event into the counters
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Launched { .. } => {
                self.launched += 1;
                self.active += 1;
                self.peak = self.peak.max(self.active);
            }
            SessionEvent::Connected { .. } => {}
            SessionEvent::Latency { phase, millis } => {
                self.latency.entry(*phase).or_default().add(*millis);
            }
            SessionEvent::TransactionStarted { .. } => self.started_tx += 1,
            SessionEvent::Error { category, .. } => {
                self.errors += 1;
                *self.errors_by_category.entry(*category).or_default() += 1;
            }
            SessionEvent::Finished { .. } => {
                self.active = self.active.saturating_sub(1);
                self.closed += 1;
            }
        }
    }

    pub fn errors_by_category(&self) -> &HashMap<ErrorCategory, u64> {
        &self.errors_by_category
    }

    fn mean(&self, phase: LatencyPhase) -> u64 {
        self.latency.get(&phase).map_or(0, Mean::rounded)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total,
            launched: self.launched,
            active: self.active,
            started_tx: self.started_tx,
            closed: self.closed,
            errors: self.errors,
            peak: self.peak,
            avg_latency_ms: LatencySummary {
                boot: self.mean(LatencyPhase::Boot),
                auth: self.mean(LatencyPhase::Auth),
                start: self.mean(LatencyPhase::Start),
                stop: self.mean(LatencyPhase::Stop),
            },
        }
    }
}
