//! Cancellable wake-ups at profile period boundaries

use crate::evaluator::boundaries;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ocpp_types::v16j::{ChargingProfile, ChargingProfileKindType, RecurrencyKindType};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::{debug, trace};

const DAILY_TICK: Duration = Duration::from_secs(60);
const WEEKLY_TICK: Duration = Duration::from_secs(300);
const HORIZON_DAYS: i64 = 7;

/// One task per installed profile, keyed by `(connectorId, profileId)`.
///
/// Each task sends the connector id on the channel whenever the limit of
/// that connector may have changed. Handles are aborted when the profile
/// is evicted or cleared and when the set is dropped.
#[derive(Debug)]
pub struct RecalcTimers {
    handles: HashMap<(u32, i32), JoinHandle<()>>,
    wake_tx: mpsc::UnboundedSender<u32>,
}

impl RecalcTimers {
    pub fn new(wake_tx: mpsc::UnboundedSender<u32>) -> Self {
        Self {
            handles: HashMap::new(),
            wake_tx,
        }
    }

    /// (Re)arm the timer of `profile` on `connector`
    pub fn schedule(
        &mut self,
        connector: u32,
        profile: &ChargingProfile,
        tx_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let key = (connector, profile.charging_profile_id);
        self.cancel(connector, profile.charging_profile_id);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!("No runtime, profile #{} will not wake up", key.1);
            return;
        };

        let wake_tx = self.wake_tx.clone();
        let handle = match tick_for(profile) {
            Some(period) => runtime.spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    if wake_tx.send(connector).is_err() {
                        break;
                    }
                }
            }),
            None => {
                let until = now + ChronoDuration::days(HORIZON_DAYS);
                let delays: Vec<Duration> = boundaries(profile, tx_start, now, until)
                    .into_iter()
                    .filter_map(|at| (at - now).to_std().ok())
                    .collect();
                if delays.is_empty() {
                    return;
                }
                debug!(
                    "Profile #{} on connector {}: {} boundary wake-ups",
                    key.1,
                    connector,
                    delays.len()
                );
                let origin = Instant::now();
                runtime.spawn(async move {
                    for delay in delays {
                        sleep_until(origin + delay).await;
                        if wake_tx.send(connector).is_err() {
                            break;
                        }
                    }
                })
            }
        };
        self.handles.insert(key, handle);
    }

    pub fn cancel(&mut self, connector: u32, profile_id: i32) {
        if let Some(handle) = self.handles.remove(&(connector, profile_id)) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn is_armed(&self, connector: u32, profile_id: i32) -> bool {
        self.handles.contains_key(&(connector, profile_id))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for RecalcTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn tick_for(profile: &ChargingProfile) -> Option<Duration> {
    match (profile.charging_profile_kind, profile.recurrency_kind) {
        (ChargingProfileKindType::Recurring, Some(RecurrencyKindType::Weekly)) => Some(WEEKLY_TICK),
        (ChargingProfileKindType::Recurring, _) => Some(DAILY_TICK),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_types::v16j::{ChargingSchedule, ChargingSchedulePeriod};

    fn relative_profile() -> ChargingProfile {
        ChargingProfile {
            charging_profile_id: 4,
            transaction_id: None,
            stack_level: 0,
            charging_profile_purpose: Default::default(),
            charging_profile_kind: ChargingProfileKindType::Relative,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            charging_schedule: ChargingSchedule {
                duration: None,
                start_schedule: None,
                charging_rate_unit: Default::default(),
                charging_schedule_period: vec![
                    ChargingSchedulePeriod::new(0, 11000.0),
                    ChargingSchedulePeriod::new(30, 6000.0),
                    ChargingSchedulePeriod::new(90, 3000.0),
                ],
                min_charging_rate: None,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wakes_at_each_future_boundary() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = RecalcTimers::new(tx);
        let now = Utc::now();

        timers.schedule(1, &relative_profile(), Some(now), now);
        assert!(timers.is_armed(1, 4));

        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(started.elapsed().as_secs(), 30);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(started.elapsed().as_secs(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_wake_ups() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = RecalcTimers::new(tx);
        let now = Utc::now();

        timers.schedule(1, &relative_profile(), Some(now), now);
        timers.cancel(1, 4);
        assert!(timers.is_empty());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_profiles_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = RecalcTimers::new(tx);
        let mut profile = relative_profile();
        profile.charging_profile_kind = ChargingProfileKindType::Recurring;
        profile.recurrency_kind = Some(RecurrencyKindType::Weekly);

        timers.schedule(2, &profile, None, Utc::now());
        let started = Instant::now();
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(started.elapsed(), WEEKLY_TICK);
    }

    #[test]
    fn test_no_runtime_means_no_timer() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = RecalcTimers::new(tx);
        let now = Utc::now();
        timers.schedule(1, &relative_profile(), Some(now), now);
        assert!(timers.is_empty());
    }
}
