//! Per-connector charging profile storage and effective limit resolution

use crate::evaluator::{self, boundaries};
use crate::profile;
use crate::timers::RecalcTimers;
use crate::{ConnectorConfig, EffectiveLimit, LimitSource};
use chrono::{DateTime, Duration, Utc};
use ocpp_messages::v16j::ClearChargingProfileRequest;
use ocpp_types::v16j::{
    ChargingProfile, ChargingProfileKindType, ChargingProfilePurposeType, ChargingProfileStatus,
    ClearChargingProfileStatus,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const NEXT_CHANGE_HORIZON_DAYS: i64 = 8;

/// Filter for [`ChargingProfileStore::clear`]; every supplied field must match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearCriteria {
    pub id: Option<i32>,
    pub connector_id: Option<u32>,
    pub purpose: Option<ChargingProfilePurposeType>,
    pub stack_level: Option<u32>,
}

impl ClearCriteria {
    fn matches(&self, profile: &ChargingProfile) -> bool {
        self.id.map_or(true, |id| profile.charging_profile_id == id)
            && self
                .purpose
                .map_or(true, |p| profile.charging_profile_purpose == p)
            && self
                .stack_level
                .map_or(true, |level| profile.stack_level == level)
    }
}

impl From<&ClearChargingProfileRequest> for ClearCriteria {
    fn from(request: &ClearChargingProfileRequest) -> Self {
        Self {
            id: request.id,
            connector_id: request.connector_id.map(profile::charging_connector),
            purpose: request.charging_profile_purpose,
            stack_level: request.stack_level,
        }
    }
}

/// Result of a clear request
#[derive(Debug, Clone, PartialEq)]
pub struct ClearOutcome {
    pub status: ClearChargingProfileStatus,
    /// `(connectorId, profileId)` of every removed profile
    pub removed: Vec<(u32, i32)>,
}

#[derive(Debug, Clone)]
struct ConnectorState {
    config: ConnectorConfig,
    profiles: BTreeMap<i32, ChargingProfile>,
    transaction_start: Option<DateTime<Utc>>,
}

impl ConnectorState {
    fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            profiles: BTreeMap::new(),
            transaction_start: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedLimit {
    limit: EffectiveLimit,
    valid_until: Option<DateTime<Utc>>,
}

/// Charging profiles installed by the central system, per connector.
///
/// Owned by a single session. Limit changes are published on a `watch`
/// channel as a map of connector id to watts; period boundaries wake the
/// owner through [`next_recalc`](Self::next_recalc).
#[derive(Debug)]
pub struct ChargingProfileStore {
    defaults: ConnectorConfig,
    connectors: BTreeMap<u32, ConnectorState>,
    cache: HashMap<u32, CachedLimit>,
    timers: RecalcTimers,
    wake_rx: mpsc::UnboundedReceiver<u32>,
    limits: watch::Sender<BTreeMap<u32, f64>>,
}

impl Default for ChargingProfileStore {
    fn default() -> Self {
        Self::new(ConnectorConfig::default())
    }
}

impl ChargingProfileStore {
    /// New store; `defaults` is used for connectors that are not configured
    /// explicitly before a profile is installed on them.
    pub fn new(defaults: ConnectorConfig) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let (limits, _) = watch::channel(BTreeMap::new());
        Self {
            defaults,
            connectors: BTreeMap::new(),
            cache: HashMap::new(),
            timers: RecalcTimers::new(wake_tx),
            wake_rx,
            limits,
        }
    }

    pub fn configure_connector(&mut self, connector: u32, config: ConnectorConfig) {
        self.connectors
            .entry(connector)
            .and_modify(|state| state.config = config)
            .or_insert_with(|| ConnectorState::new(config));
        self.cache.remove(&connector);
    }

    pub fn connector_config(&self, connector: u32) -> Option<ConnectorConfig> {
        self.connectors.get(&connector).map(|state| state.config)
    }

    /// Profiles installed on `connector`, ordered by id
    pub fn profiles(&self, connector: u32) -> Vec<&ChargingProfile> {
        self.connectors
            .get(&connector)
            .map(|state| state.profiles.values().collect())
            .unwrap_or_default()
    }

    pub fn transaction_start(&self, connector: u32) -> Option<DateTime<Utc>> {
        self.connectors
            .get(&connector)
            .and_then(|state| state.transaction_start)
    }

    /// Install a profile.
    ///
    /// Same-purpose profiles with a stack level at or below the new one are
    /// evicted first. A relative profile installed outside a transaction
    /// starts its clock now.
    pub fn install(
        &mut self,
        connector: u32,
        profile: ChargingProfile,
        now: DateTime<Utc>,
    ) -> ChargingProfileStatus {
        let profile = profile::normalize(profile);
        if let Err(e) = profile::validate(&profile) {
            warn!(
                "Rejected charging profile #{} on connector {}: {}",
                profile.charging_profile_id, connector, e
            );
            return ChargingProfileStatus::Rejected;
        }

        let defaults = self.defaults;
        let state = self
            .connectors
            .entry(connector)
            .or_insert_with(|| ConnectorState::new(defaults));

        let evicted: Vec<i32> = state
            .profiles
            .values()
            .filter(|existing| {
                existing.charging_profile_id == profile.charging_profile_id
                    || (existing.charging_profile_purpose == profile.charging_profile_purpose
                        && existing.stack_level <= profile.stack_level)
            })
            .map(|existing| existing.charging_profile_id)
            .collect();
        for id in &evicted {
            state.profiles.remove(id);
            self.timers.cancel(connector, *id);
        }
        if !evicted.is_empty() {
            debug!("Connector {}: evicted profiles {:?}", connector, evicted);
        }

        if profile.charging_profile_kind == ChargingProfileKindType::Relative
            && state.transaction_start.is_none()
        {
            debug!("Connector {}: relative profile starts its clock now", connector);
            state.transaction_start = Some(now);
        }

        info!(
            "Installed {} #{} (stack {}) on connector {}",
            profile.charging_profile_purpose,
            profile.charging_profile_id,
            profile.stack_level,
            connector
        );
        self.timers
            .schedule(connector, &profile, state.transaction_start, now);
        state.profiles.insert(profile.charging_profile_id, profile);

        self.recalculate(connector, now);
        ChargingProfileStatus::Accepted
    }

    /// Remove every profile matching `criteria`
    pub fn clear(&mut self, criteria: &ClearCriteria, now: DateTime<Utc>) -> ClearOutcome {
        let mut removed = Vec::new();
        for (connector, state) in self.connectors.iter_mut() {
            if criteria.connector_id.map_or(false, |c| c != *connector) {
                continue;
            }
            let ids: Vec<i32> = state
                .profiles
                .values()
                .filter(|profile| criteria.matches(profile))
                .map(|profile| profile.charging_profile_id)
                .collect();
            for id in ids {
                state.profiles.remove(&id);
                self.timers.cancel(*connector, id);
                removed.push((*connector, id));
            }
        }

        let mut touched: Vec<u32> = removed.iter().map(|(connector, _)| *connector).collect();
        touched.dedup();
        for connector in touched {
            self.recalculate(connector, now);
        }

        let status = if removed.is_empty() {
            ClearChargingProfileStatus::Unknown
        } else {
            info!("Cleared charging profiles {:?}", removed);
            ClearChargingProfileStatus::Accepted
        };
        ClearOutcome { status, removed }
    }

    /// Resolve the limit on `connector` at `now` without touching the cache.
    ///
    /// Profiles are tried by purpose priority, then stack level, both
    /// descending; the first one that applies wins.
    pub fn pick_effective(&self, connector: u32, now: DateTime<Utc>) -> EffectiveLimit {
        let Some(state) = self.connectors.get(&connector) else {
            return EffectiveLimit::fallback(self.defaults.max_power_w, LimitSource::Default, now);
        };

        let mut candidates: Vec<&ChargingProfile> = state.profiles.values().collect();
        candidates.sort_by(|a, b| {
            b.charging_profile_purpose
                .priority()
                .cmp(&a.charging_profile_purpose.priority())
                .then(b.stack_level.cmp(&a.stack_level))
        });

        let next_change_in_sec = self.next_change_in_sec(state, now);
        for profile in candidates {
            if let Some(eval) =
                evaluator::evaluate(profile, &state.config, now, state.transaction_start)
            {
                return EffectiveLimit {
                    limit_w: eval.limit_w,
                    source: LimitSource::Profile,
                    profile_id: Some(profile.charging_profile_id),
                    purpose: Some(profile.charging_profile_purpose),
                    stack_level: Some(profile.stack_level),
                    computed_at: now,
                    next_change_in_sec,
                };
            }
        }

        EffectiveLimit {
            next_change_in_sec,
            ..EffectiveLimit::fallback(state.config.max_power_w, LimitSource::Physical, now)
        }
    }

    /// Cached variant of [`pick_effective`](Self::pick_effective); the cache
    /// entry lives until the next boundary of any profile on the connector.
    pub fn effective_limit(&mut self, connector: u32, now: DateTime<Utc>) -> EffectiveLimit {
        if let Some(cached) = self.cache.get(&connector) {
            let fresh = now >= cached.limit.computed_at
                && cached.valid_until.map_or(true, |until| now < until);
            if fresh {
                return cached.limit.clone();
            }
        }

        let limit = self.pick_effective(connector, now);
        let valid_until = limit
            .next_change_in_sec
            .map(|secs| now + Duration::seconds(secs as i64));
        self.cache.insert(
            connector,
            CachedLimit {
                limit: limit.clone(),
                valid_until,
            },
        );
        limit
    }

    /// Effective limit in watts
    pub fn current_limit_w(&mut self, connector: u32, now: DateTime<Utc>) -> f64 {
        self.effective_limit(connector, now).limit_w
    }

    /// Record the transaction start on `connector` and re-arm relative
    /// profiles against it
    pub fn mark_transaction_start(&mut self, connector: u32, at: DateTime<Utc>) {
        let defaults = self.defaults;
        let state = self
            .connectors
            .entry(connector)
            .or_insert_with(|| ConnectorState::new(defaults));
        state.transaction_start = Some(at);

        for profile in state.profiles.values() {
            if profile.charging_profile_kind == ChargingProfileKindType::Relative {
                self.timers.schedule(connector, profile, Some(at), at);
            }
        }
        self.recalculate(connector, at);
    }

    pub fn mark_transaction_stop(&mut self, connector: u32, now: DateTime<Utc>) {
        let Some(state) = self.connectors.get_mut(&connector) else {
            return;
        };
        state.transaction_start = None;
        for profile in state.profiles.values() {
            if profile.charging_profile_kind == ChargingProfileKindType::Relative {
                self.timers.cancel(connector, profile.charging_profile_id);
            }
        }
        self.recalculate(connector, now);
    }

    /// Recompute the limit on `connector`; returns it if it differs from
    /// the last published value.
    pub fn recalculate(&mut self, connector: u32, now: DateTime<Utc>) -> Option<EffectiveLimit> {
        self.cache.remove(&connector);
        let current = self.effective_limit(connector, now);

        let previous = self.limits.borrow().get(&connector).copied();
        if previous == Some(current.limit_w) {
            return None;
        }

        info!(
            "Connector {}: limit {} -> {:.0} W ({:?})",
            connector,
            previous.map_or_else(|| "none".to_string(), |w| format!("{w:.0} W")),
            current.limit_w,
            current.source
        );
        self.limits.send_modify(|limits| {
            limits.insert(connector, current.limit_w);
        });
        Some(current)
    }

    /// Follow the published limits
    pub fn subscribe(&self) -> watch::Receiver<BTreeMap<u32, f64>> {
        self.limits.subscribe()
    }

    /// Wait until a profile boundary is crossed; yields the connector id.
    /// Never resolves when no timers are armed.
    pub async fn next_recalc(&mut self) -> Option<u32> {
        self.wake_rx.recv().await
    }

    /// Drop every profile and transaction mark
    pub fn reset(&mut self) {
        self.timers.cancel_all();
        for state in self.connectors.values_mut() {
            state.profiles.clear();
            state.transaction_start = None;
        }
        self.cache.clear();
    }

    fn next_change_in_sec(&self, state: &ConnectorState, now: DateTime<Utc>) -> Option<u64> {
        let until = now + Duration::days(NEXT_CHANGE_HORIZON_DAYS);
        state
            .profiles
            .values()
            .filter_map(|profile| {
                boundaries(profile, state.transaction_start, now, until)
                    .into_iter()
                    .next()
            })
            .min()
            .map(|at| evaluator::elapsed_secs(now, at).max(1))
    }
}
