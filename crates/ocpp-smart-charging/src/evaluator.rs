//! Evaluation of a single charging profile at an instant

use crate::ConnectorConfig;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use ocpp_types::v16j::{
    ChargingProfile, ChargingProfileKindType, ChargingRateUnitType, ChargingSchedulePeriod,
    RecurrencyKindType,
};

/// Zero-limit periods shorter than this are skipped in favour of the next one
pub const SHORT_ZERO_PERIOD_SECS: u32 = 10;

/// Outcome of evaluating one profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Limit in watts, already clamped to the connector maximum
    pub limit_w: f64,
    /// Index of the schedule period that produced the limit
    pub period_index: usize,
    /// Seconds until the next period boundary or expiry
    pub next_change_in_sec: Option<u64>,
}

/// Limit imposed by `profile` at `now`, or `None` if it does not apply.
///
/// `tx_start` is the recorded transaction start of the connector and only
/// matters for relative profiles.
pub fn evaluate(
    profile: &ChargingProfile,
    connector: &ConnectorConfig,
    now: DateTime<Utc>,
    tx_start: Option<DateTime<Utc>>,
) -> Option<Evaluation> {
    if !is_valid_at(profile, now) {
        return None;
    }

    let start = window_start(profile, now, tx_start)?;
    let raw_elapsed = elapsed_secs(start, now);
    let schedule = &profile.charging_schedule;

    let (elapsed, remaining) = match (profile.charging_profile_kind, schedule.duration) {
        (ChargingProfileKindType::Recurring, Some(duration)) if profile.recurrency_kind.is_none() => {
            let elapsed = raw_elapsed % duration;
            (elapsed, Some(duration - elapsed))
        }
        (_, Some(duration)) => {
            if raw_elapsed > duration {
                return None;
            }
            (raw_elapsed, Some(duration - raw_elapsed + 1))
        }
        (_, None) => (raw_elapsed, None),
    };

    let periods = &schedule.charging_schedule_period;
    let period_index = active_period(periods, elapsed)?;
    let period = &periods[period_index];

    let mut limit_w = to_watts(
        period.limit,
        schedule.charging_rate_unit,
        period.number_phases,
        connector,
    );
    if let Some(min_rate) = schedule.min_charging_rate {
        let min_w = to_watts(
            min_rate,
            schedule.charging_rate_unit,
            period.number_phases,
            connector,
        );
        limit_w = limit_w.max(min_w);
    }

    let next_boundary = periods
        .iter()
        .map(|p| u64::from(p.start_period))
        .find(|start| *start > elapsed)
        .map(|start| start - elapsed);
    let next_change_in_sec = match (next_boundary, remaining) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    Some(Evaluation {
        limit_w: clamp(limit_w, connector.max_power_w),
        period_index,
        next_change_in_sec,
    })
}

/// `validFrom`/`validTo` gate, inclusive on both ends
pub fn is_valid_at(profile: &ChargingProfile, now: DateTime<Utc>) -> bool {
    if matches!(profile.valid_from, Some(from) if now < from) {
        return false;
    }
    !matches!(profile.valid_to, Some(to) if now > to)
}

/// Instant the schedule's period offsets are measured from.
///
/// Daily and weekly recurring profiles align on the time of day of
/// `startSchedule` (weekly additionally on Monday) and step back one
/// recurrence when that alignment lies in the future.
pub fn window_start(
    profile: &ChargingProfile,
    now: DateTime<Utc>,
    tx_start: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let start_schedule = profile.charging_schedule.start_schedule;
    match profile.charging_profile_kind {
        ChargingProfileKindType::Relative => tx_start,
        ChargingProfileKindType::Absolute => {
            Some(start_schedule.unwrap_or_else(|| now - Duration::seconds(1)))
        }
        ChargingProfileKindType::Recurring => match profile.recurrency_kind {
            None => Some(start_schedule.unwrap_or_else(|| now - Duration::seconds(1))),
            Some(kind) => {
                let time_of_day = start_schedule.map(|s| s.time()).unwrap_or_else(|| now.time());
                Some(recurring_window_start(kind, time_of_day, now))
            }
        },
    }
}

fn recurring_window_start(
    kind: RecurrencyKindType,
    time_of_day: NaiveTime,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let time_of_day = time_of_day.with_nanosecond(0).unwrap_or(time_of_day);
    let (day, step) = match kind {
        RecurrencyKindType::Daily => (now.date_naive(), Duration::days(1)),
        RecurrencyKindType::Weekly => {
            let offset = i64::from(now.weekday().num_days_from_monday());
            (now.date_naive() - Duration::days(offset), Duration::days(7))
        }
    };
    let start = day.and_time(time_of_day).and_utc();
    if start > now {
        start - step
    } else {
        start
    }
}

/// Whole seconds from `start` to `now`, never negative
pub fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (now - start).num_milliseconds();
    u64::try_from(millis.div_euclid(1000)).unwrap_or(0)
}

/// Index of the period in force after `elapsed` seconds.
///
/// A zero-limit period lasting less than [`SHORT_ZERO_PERIOD_SECS`] that is
/// followed by a non-zero period yields the following period instead.
pub fn active_period(periods: &[ChargingSchedulePeriod], elapsed: u64) -> Option<usize> {
    let index = periods
        .iter()
        .rposition(|p| u64::from(p.start_period) <= elapsed)?;

    if let Some(next) = periods.get(index + 1) {
        let current = &periods[index];
        if current.limit == 0.0
            && next.limit > 0.0
            && next.start_period.saturating_sub(current.start_period) < SHORT_ZERO_PERIOD_SECS
        {
            return Some(index + 1);
        }
    }
    Some(index)
}

/// Convert a schedule value to watts
pub fn to_watts(
    value: f64,
    unit: ChargingRateUnitType,
    number_phases: Option<u32>,
    connector: &ConnectorConfig,
) -> f64 {
    match unit {
        ChargingRateUnitType::W => value,
        ChargingRateUnitType::A => {
            let phases = number_phases.unwrap_or(connector.phases);
            value * connector.voltage * f64::from(phases)
        }
    }
}

/// Convert watts back to amps using the connector's phases
pub fn to_amps(watts: f64, connector: &ConnectorConfig) -> f64 {
    let divisor = connector.voltage * f64::from(connector.phases.max(1));
    if divisor > 0.0 {
        watts / divisor
    } else {
        0.0
    }
}

fn clamp(limit_w: f64, max_power_w: f64) -> f64 {
    limit_w.max(0.0).min(max_power_w.max(0.0))
}

/// Instants in `(from, until]` at which the evaluation of `profile` may
/// change: period starts, expiry, validity edges and recurrence restarts.
pub fn boundaries(
    profile: &ChargingProfile,
    tx_start: Option<DateTime<Utc>>,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let schedule = &profile.charging_schedule;
    let mut points = Vec::new();

    let push_window = |start: DateTime<Utc>, points: &mut Vec<DateTime<Utc>>| {
        points.push(start);
        for period in &schedule.charging_schedule_period {
            points.push(start + Duration::seconds(i64::from(period.start_period)));
        }
        if let Some(duration) = schedule.duration {
            points.push(start + Duration::seconds(duration as i64 + 1));
        }
    };

    let step = match (profile.charging_profile_kind, profile.recurrency_kind) {
        (ChargingProfileKindType::Recurring, Some(RecurrencyKindType::Daily)) => {
            Some(Duration::days(1))
        }
        (ChargingProfileKindType::Recurring, Some(RecurrencyKindType::Weekly)) => {
            Some(Duration::days(7))
        }
        (ChargingProfileKindType::Recurring, None) => schedule
            .duration
            .filter(|d| *d > 0)
            .map(|d| Duration::seconds(d as i64)),
        _ => None,
    };

    if let Some(start) = window_start(profile, from, tx_start) {
        match step {
            Some(step) => {
                let mut window = start;
                while window <= until {
                    push_window(window, &mut points);
                    window += step;
                }
            }
            None => push_window(start, &mut points),
        }
    }

    if let Some(valid_from) = profile.valid_from {
        points.push(valid_from);
    }
    if let Some(valid_to) = profile.valid_to {
        points.push(valid_to + Duration::seconds(1));
    }

    points.retain(|p| *p > from && *p <= until);
    points.sort();
    points.dedup();
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ocpp_types::v16j::{ChargingProfilePurposeType, ChargingSchedule};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        // 2024-03-13 is a Wednesday
        Utc.with_ymd_and_hms(2024, 3, 13, h, m, s).unwrap()
    }

    fn profile(
        kind: ChargingProfileKindType,
        unit: ChargingRateUnitType,
        periods: Vec<ChargingSchedulePeriod>,
    ) -> ChargingProfile {
        ChargingProfile {
            charging_profile_id: 1,
            transaction_id: None,
            stack_level: 0,
            charging_profile_purpose: ChargingProfilePurposeType::TxDefaultProfile,
            charging_profile_kind: kind,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            charging_schedule: ChargingSchedule {
                duration: None,
                start_schedule: None,
                charging_rate_unit: unit,
                charging_schedule_period: periods,
                min_charging_rate: None,
            },
        }
    }

    fn watts(periods: Vec<ChargingSchedulePeriod>) -> ChargingProfile {
        profile(ChargingProfileKindType::Absolute, ChargingRateUnitType::W, periods)
    }

    #[test]
    fn test_absolute_without_start_is_already_running() {
        let p = watts(vec![ChargingSchedulePeriod::new(0, 7400.0)]);
        let eval = evaluate(&p, &ConnectorConfig::default(), at(12, 0, 0), None).unwrap();
        assert_eq!(eval.limit_w, 7400.0);
        assert_eq!(eval.period_index, 0);
        assert_eq!(eval.next_change_in_sec, None);
    }

    #[test]
    fn test_absolute_period_selection_and_expiry() {
        let mut p = watts(vec![
            ChargingSchedulePeriod::new(0, 11000.0),
            ChargingSchedulePeriod::new(600, 3700.0),
        ]);
        p.charging_schedule.start_schedule = Some(at(12, 0, 0));
        p.charging_schedule.duration = Some(1200);
        let cfg = ConnectorConfig::default();

        assert!(evaluate(&p, &cfg, at(11, 59, 59), None).is_none());

        let eval = evaluate(&p, &cfg, at(12, 5, 0), None).unwrap();
        assert_eq!(eval.limit_w, 11000.0);
        assert_eq!(eval.next_change_in_sec, Some(300));

        let eval = evaluate(&p, &cfg, at(12, 20, 0), None).unwrap();
        assert_eq!(eval.limit_w, 3700.0);

        assert!(evaluate(&p, &cfg, at(12, 20, 1), None).is_none());
    }

    #[test]
    fn test_amps_use_period_phases_then_connector_phases() {
        let mut p = profile(
            ChargingProfileKindType::Absolute,
            ChargingRateUnitType::A,
            vec![ChargingSchedulePeriod::new(0, 16.0)],
        );
        let cfg = ConnectorConfig {
            voltage: 230.0,
            phases: 1,
            max_power_w: 22_000.0,
        };
        let eval = evaluate(&p, &cfg, at(12, 0, 0), None).unwrap();
        assert_eq!(eval.limit_w, 16.0 * 230.0);

        p.charging_schedule.charging_schedule_period[0].number_phases = Some(3);
        let eval = evaluate(&p, &cfg, at(12, 0, 0), None).unwrap();
        assert_eq!(eval.limit_w, 16.0 * 230.0 * 3.0);
    }

    #[test]
    fn test_min_rate_and_clamp() {
        let mut p = watts(vec![ChargingSchedulePeriod::new(0, 1000.0)]);
        p.charging_schedule.min_charging_rate = Some(1400.0);
        let cfg = ConnectorConfig::default();
        assert_eq!(evaluate(&p, &cfg, at(12, 0, 0), None).unwrap().limit_w, 1400.0);

        let p = watts(vec![ChargingSchedulePeriod::new(0, 50_000.0)]);
        assert_eq!(evaluate(&p, &cfg, at(12, 0, 0), None).unwrap().limit_w, 22_000.0);
    }

    #[test]
    fn test_short_zero_period_is_skipped() {
        let periods = vec![
            ChargingSchedulePeriod::new(0, 0.0),
            ChargingSchedulePeriod::new(5, 7400.0),
        ];
        assert_eq!(active_period(&periods, 2), Some(1));

        let periods = vec![
            ChargingSchedulePeriod::new(0, 0.0),
            ChargingSchedulePeriod::new(30, 7400.0),
        ];
        assert_eq!(active_period(&periods, 2), Some(0));

        let periods = vec![
            ChargingSchedulePeriod::new(0, 0.0),
            ChargingSchedulePeriod::new(5, 0.0),
        ];
        assert_eq!(active_period(&periods, 2), Some(0));
    }

    #[test]
    fn test_missing_first_period_means_no_limit() {
        let periods = vec![ChargingSchedulePeriod::new(60, 5000.0)];
        assert_eq!(active_period(&periods, 30), None);
        assert_eq!(active_period(&periods, 60), Some(0));
    }

    #[test]
    fn test_daily_window_applies_for_first_hour_only() {
        let mut p = profile(
            ChargingProfileKindType::Recurring,
            ChargingRateUnitType::W,
            vec![ChargingSchedulePeriod::new(0, 10000.0)],
        );
        p.recurrency_kind = Some(RecurrencyKindType::Daily);
        p.charging_schedule.duration = Some(3600);
        p.charging_schedule.start_schedule =
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        let cfg = ConnectorConfig::default();

        for now in [at(8, 0, 0), at(8, 30, 0), at(9, 0, 0)] {
            assert_eq!(evaluate(&p, &cfg, now, None).unwrap().limit_w, 10000.0);
        }
        for now in [at(9, 0, 1), at(12, 0, 0), at(7, 59, 59)] {
            assert!(evaluate(&p, &cfg, now, None).is_none(), "{now}");
        }

        let next_day = Utc.with_ymd_and_hms(2024, 3, 14, 8, 15, 0).unwrap();
        assert!(evaluate(&p, &cfg, next_day, None).is_some());
    }

    #[test]
    fn test_weekly_window_aligns_on_monday() {
        let mut p = profile(
            ChargingProfileKindType::Recurring,
            ChargingRateUnitType::W,
            vec![ChargingSchedulePeriod::new(0, 4000.0)],
        );
        p.recurrency_kind = Some(RecurrencyKindType::Weekly);
        p.charging_schedule.start_schedule =
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());

        let start = window_start(&p, at(12, 0, 0), None).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap());

        let monday_early = Utc.with_ymd_and_hms(2024, 3, 11, 5, 0, 0).unwrap();
        let start = window_start(&p, monday_early, None).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_recurring_without_kind_wraps_on_duration() {
        let mut p = profile(
            ChargingProfileKindType::Recurring,
            ChargingRateUnitType::W,
            vec![
                ChargingSchedulePeriod::new(0, 2000.0),
                ChargingSchedulePeriod::new(60, 4000.0),
            ],
        );
        p.charging_schedule.duration = Some(120);
        p.charging_schedule.start_schedule = Some(at(12, 0, 0));
        let cfg = ConnectorConfig::default();

        assert_eq!(evaluate(&p, &cfg, at(12, 1, 30), None).unwrap().limit_w, 4000.0);
        assert_eq!(evaluate(&p, &cfg, at(12, 2, 30), None).unwrap().limit_w, 2000.0);
    }

    #[test]
    fn test_relative_requires_transaction_start() {
        let p = profile(
            ChargingProfileKindType::Relative,
            ChargingRateUnitType::W,
            vec![
                ChargingSchedulePeriod::new(0, 11000.0),
                ChargingSchedulePeriod::new(60, 7000.0),
                ChargingSchedulePeriod::new(120, 3000.0),
                ChargingSchedulePeriod::new(180, 9000.0),
            ],
        );
        let cfg = ConnectorConfig::default();
        assert!(evaluate(&p, &cfg, at(12, 0, 0), None).is_none());

        let tx = Some(at(12, 0, 0));
        let limits: Vec<f64> = [0, 60, 120, 180, 240]
            .iter()
            .map(|s| {
                let now = at(12, 0, 0) + Duration::seconds(*s);
                evaluate(&p, &cfg, now, tx).unwrap().limit_w
            })
            .collect();
        assert_eq!(limits, vec![11000.0, 7000.0, 3000.0, 9000.0, 9000.0]);
    }

    #[test]
    fn test_validity_gate() {
        let mut p = watts(vec![ChargingSchedulePeriod::new(0, 5000.0)]);
        p.valid_from = Some(at(10, 0, 0));
        p.valid_to = Some(at(11, 0, 0));
        let cfg = ConnectorConfig::default();

        assert!(evaluate(&p, &cfg, at(9, 59, 59), None).is_none());
        assert!(evaluate(&p, &cfg, at(10, 30, 0), None).is_some());
        assert!(evaluate(&p, &cfg, at(11, 0, 1), None).is_none());
    }

    #[test]
    fn test_boundaries_cover_periods_and_expiry() {
        let mut p = watts(vec![
            ChargingSchedulePeriod::new(0, 11000.0),
            ChargingSchedulePeriod::new(600, 3700.0),
        ]);
        p.charging_schedule.start_schedule = Some(at(12, 0, 0));
        p.charging_schedule.duration = Some(1200);

        let points = boundaries(&p, None, at(11, 0, 0), at(13, 0, 0));
        assert_eq!(points, vec![at(12, 0, 0), at(12, 10, 0), at(12, 20, 1)]);

        let points = boundaries(&p, None, at(12, 5, 0), at(12, 15, 0));
        assert_eq!(points, vec![at(12, 10, 0)]);
    }
}
