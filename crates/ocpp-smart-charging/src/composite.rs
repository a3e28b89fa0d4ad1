//! Composite schedule: the effective limit of a connector flattened over a
//! window starting now

use crate::evaluator::{boundaries, to_amps};
use crate::store::ChargingProfileStore;
use chrono::{DateTime, Duration, Utc};
use ocpp_messages::v16j::GetCompositeScheduleResponse;
use ocpp_types::v16j::{
    ChargingRateUnitType, ChargingSchedule, ChargingSchedulePeriod, GetCompositeScheduleStatus,
};

/// Build the answer to GetCompositeSchedule.
///
/// The limit is sampled at `now` and at every boundary of every profile on
/// the connector within `duration` seconds; consecutive equal samples are
/// merged into one period.
pub fn composite_schedule(
    store: &ChargingProfileStore,
    connector: u32,
    duration: i64,
    unit: Option<ChargingRateUnitType>,
    now: DateTime<Utc>,
) -> GetCompositeScheduleResponse {
    if duration <= 0 {
        return GetCompositeScheduleResponse::rejected();
    }
    let unit = unit.unwrap_or_default();
    let until = now + Duration::seconds(duration);
    let config = store.connector_config(connector).unwrap_or_default();
    let tx_start = store.transaction_start(connector);

    let mut instants: Vec<DateTime<Utc>> = store
        .profiles(connector)
        .into_iter()
        .flat_map(|profile| boundaries(profile, tx_start, now, until))
        .filter(|at| *at < until)
        .collect();
    instants.push(now);
    instants.sort();
    instants.dedup();

    let mut periods: Vec<ChargingSchedulePeriod> = Vec::new();
    for at in instants {
        let limit_w = store.pick_effective(connector, at).limit_w;
        let limit = match unit {
            ChargingRateUnitType::W => limit_w,
            ChargingRateUnitType::A => (to_amps(limit_w, &config) * 10.0).round() / 10.0,
        };
        if periods.last().map_or(false, |last| last.limit == limit) {
            continue;
        }
        let offset = (at - now).num_seconds().max(0);
        periods.push(ChargingSchedulePeriod::new(
            u32::try_from(offset).unwrap_or(u32::MAX),
            limit,
        ));
    }

    GetCompositeScheduleResponse {
        status: GetCompositeScheduleStatus::Accepted,
        connector_id: Some(connector),
        schedule_start: Some(now),
        charging_schedule: Some(ChargingSchedule {
            duration: u64::try_from(duration).ok(),
            start_schedule: Some(now),
            charging_rate_unit: unit,
            charging_schedule_period: periods,
            min_charging_rate: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectorConfig;
    use chrono::TimeZone;
    use ocpp_types::v16j::{ChargingProfile, ChargingProfileKindType, ChargingProfilePurposeType};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    fn stepped_profile() -> ChargingProfile {
        ChargingProfile {
            charging_profile_id: 1,
            transaction_id: None,
            stack_level: 0,
            charging_profile_purpose: ChargingProfilePurposeType::TxDefaultProfile,
            charging_profile_kind: ChargingProfileKindType::Absolute,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            charging_schedule: ChargingSchedule {
                duration: Some(1800),
                start_schedule: Some(now()),
                charging_rate_unit: ChargingRateUnitType::W,
                charging_schedule_period: vec![
                    ChargingSchedulePeriod::new(0, 6900.0),
                    ChargingSchedulePeriod::new(600, 6900.0),
                    ChargingSchedulePeriod::new(1200, 2300.0),
                ],
                min_charging_rate: None,
            },
        }
    }

    #[test]
    fn test_composite_merges_equal_periods_and_falls_back_after_expiry() {
        let mut store = ChargingProfileStore::default();
        store.configure_connector(1, ConnectorConfig::default());
        store.install(1, stepped_profile(), now());

        let response = composite_schedule(&store, 1, 3600, None, now());
        assert_eq!(response.status, GetCompositeScheduleStatus::Accepted);
        let schedule = response.charging_schedule.unwrap();
        let periods: Vec<(u32, f64)> = schedule
            .charging_schedule_period
            .iter()
            .map(|p| (p.start_period, p.limit))
            .collect();
        assert_eq!(periods, vec![(0, 6900.0), (1200, 2300.0), (1801, 22_000.0)]);
    }

    #[test]
    fn test_composite_in_amps() {
        let mut store = ChargingProfileStore::default();
        store.configure_connector(1, ConnectorConfig::default());
        store.install(1, stepped_profile(), now());

        let response = composite_schedule(&store, 1, 900, Some(ChargingRateUnitType::A), now());
        let schedule = response.charging_schedule.unwrap();
        assert_eq!(schedule.charging_rate_unit, ChargingRateUnitType::A);
        assert_eq!(schedule.charging_schedule_period.len(), 1);
        assert_eq!(schedule.charging_schedule_period[0].limit, 30.0);
    }

    #[test]
    fn test_non_positive_duration_is_rejected() {
        let store = ChargingProfileStore::default();
        let response = composite_schedule(&store, 1, 0, None, now());
        assert_eq!(response.status, GetCompositeScheduleStatus::Rejected);
        assert!(response.charging_schedule.is_none());
    }
}
