//! Structural checks and normalisation applied before a profile is stored

use crate::error::{SmartChargingError, SmartChargingResult};
use ocpp_types::v16j::{ChargingProfile, ChargingProfilePurposeType};
use serde_json::Value;
use tracing::warn;

const ONE_WEEK_SECS: u64 = 7 * 24 * 3600;

/// Connector that charges
pub const CHARGING_CONNECTOR: u32 = 1;

/// Central systems occasionally send the schedule duration in
/// milliseconds. Anything longer than a week is read as milliseconds, and a
/// zero duration means "no duration".
pub fn normalize(mut profile: ChargingProfile) -> ChargingProfile {
    profile.charging_schedule.duration = match profile.charging_schedule.duration {
        Some(0) | None => None,
        Some(d) if d > ONE_WEEK_SECS => Some((d + 500) / 1000),
        Some(d) => Some(d),
    };
    profile
}

/// Reject profiles that cannot be evaluated
pub fn validate(profile: &ChargingProfile) -> SmartChargingResult<()> {
    let schedule = &profile.charging_schedule;
    if schedule.charging_schedule_period.is_empty() {
        return Err(SmartChargingError::EmptySchedule);
    }

    let mut previous: Option<u32> = None;
    for (index, period) in schedule.charging_schedule_period.iter().enumerate() {
        if let Some(previous) = previous {
            if period.start_period <= previous {
                return Err(SmartChargingError::NonIncreasingPeriods {
                    index,
                    start: period.start_period,
                    previous,
                });
            }
        }
        previous = Some(period.start_period);

        if !period.limit.is_finite() || period.limit < 0.0 {
            return Err(SmartChargingError::InvalidLimit {
                index,
                limit: period.limit,
            });
        }
        if let Some(phases) = period.number_phases {
            if !(1..=3).contains(&phases) {
                return Err(SmartChargingError::InvalidPhases { index, phases });
            }
        }
    }

    if let Some(rate) = schedule.min_charging_rate {
        if !rate.is_finite() || rate < 0.0 {
            return Err(SmartChargingError::InvalidMinRate { rate });
        }
    }

    if let (Some(from), Some(to)) = (profile.valid_from, profile.valid_to) {
        if from > to {
            return Err(SmartChargingError::EmptyValidity);
        }
    }

    if profile.charging_profile_purpose == ChargingProfilePurposeType::TxProfile
        && profile.transaction_id.is_none()
    {
        warn!(
            "TxProfile #{} has no transactionId, applying to the current transaction",
            profile.charging_profile_id
        );
    }

    Ok(())
}

/// The simulated charge point has a single connector. Profiles addressed to
/// connector 0 (the whole charge point) are applied to it.
pub fn charging_connector(connector_id: u32) -> u32 {
    if connector_id == 0 {
        CHARGING_CONNECTOR
    } else {
        connector_id
    }
}

/// Extract `(connectorId, profile)` from a SetChargingProfile payload, a
/// full `[2, id, "SetChargingProfile", payload]` frame, or a bare profile.
/// A missing or zero connector id means connector 1.
pub fn parse_set_charging_profile(payload: &Value) -> SmartChargingResult<(u32, ChargingProfile)> {
    let payload = match payload {
        Value::Array(items) if items.len() >= 4 => &items[3],
        other => other,
    };

    let connector_id = match payload.get("connectorId") {
        None | Some(Value::Null) => CHARGING_CONNECTOR,
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(charging_connector)
            .ok_or_else(|| SmartChargingError::InvalidPayload {
                message: format!("connectorId {value} is not a connector number"),
            })?,
    };

    let profile = payload
        .get("csChargingProfiles")
        .or_else(|| payload.get("chargingProfile"))
        .or_else(|| {
            (payload.get("chargingProfileId").is_some() && payload.get("chargingSchedule").is_some())
                .then_some(payload)
        })
        .ok_or_else(|| SmartChargingError::InvalidPayload {
            message: "no charging profile found".to_string(),
        })?;

    let profile: ChargingProfile = serde_json::from_value(profile.clone())?;
    Ok((connector_id, normalize(profile)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_types::v16j::{ChargingRateUnitType, ChargingSchedule, ChargingSchedulePeriod};
    use serde_json::json;

    fn profile(periods: Vec<ChargingSchedulePeriod>) -> ChargingProfile {
        ChargingProfile {
            charging_profile_id: 1,
            transaction_id: Some(1),
            stack_level: 0,
            charging_profile_purpose: ChargingProfilePurposeType::TxProfile,
            charging_profile_kind: Default::default(),
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            charging_schedule: ChargingSchedule {
                duration: None,
                start_schedule: None,
                charging_rate_unit: ChargingRateUnitType::W,
                charging_schedule_period: periods,
                min_charging_rate: None,
            },
        }
    }

    #[test]
    fn test_validate_accepts_zero_limit() {
        let p = profile(vec![
            ChargingSchedulePeriod::new(0, 0.0),
            ChargingSchedulePeriod::new(5, 7400.0),
        ]);
        assert!(validate(&p).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_schedules() {
        assert_eq!(
            validate(&profile(vec![])),
            Err(SmartChargingError::EmptySchedule)
        );

        let p = profile(vec![
            ChargingSchedulePeriod::new(0, 1000.0),
            ChargingSchedulePeriod::new(0, 2000.0),
        ]);
        assert!(matches!(
            validate(&p),
            Err(SmartChargingError::NonIncreasingPeriods { index: 1, .. })
        ));

        let p = profile(vec![ChargingSchedulePeriod::new(0, -1.0)]);
        assert!(matches!(
            validate(&p),
            Err(SmartChargingError::InvalidLimit { index: 0, .. })
        ));

        let p = profile(vec![ChargingSchedulePeriod::new(0, f64::NAN)]);
        assert!(validate(&p).is_err());

        let mut p = profile(vec![ChargingSchedulePeriod::new(0, 16.0)]);
        p.charging_schedule.charging_schedule_period[0].number_phases = Some(4);
        assert!(matches!(
            validate(&p),
            Err(SmartChargingError::InvalidPhases { phases: 4, .. })
        ));
    }

    #[test]
    fn test_normalize_duration() {
        let mut p = profile(vec![ChargingSchedulePeriod::new(0, 1.0)]);
        p.charging_schedule.duration = Some(3_600_000);
        assert_eq!(normalize(p.clone()).charging_schedule.duration, Some(3600));

        p.charging_schedule.duration = Some(7200);
        assert_eq!(normalize(p.clone()).charging_schedule.duration, Some(7200));

        p.charging_schedule.duration = Some(0);
        assert_eq!(normalize(p).charging_schedule.duration, None);
    }

    #[test]
    fn test_parse_payload_variants() {
        let bare = json!({
            "chargingProfileId": 9,
            "stackLevel": 1,
            "chargingSchedule": {"chargingSchedulePeriod": [{"startPeriod": 0, "limit": 5000}]}
        });

        let (connector, p) = parse_set_charging_profile(&bare).unwrap();
        assert_eq!(connector, 1);
        assert_eq!(p.charging_profile_id, 9);

        let wrapped = json!({"connectorId": 2, "chargingProfile": bare.clone()});
        let (connector, _) = parse_set_charging_profile(&wrapped).unwrap();
        assert_eq!(connector, 2);

        let frame = json!([2, "m-1", "SetChargingProfile", {"connectorId": 0, "csChargingProfiles": bare.clone()}]);
        let (connector, _) = parse_set_charging_profile(&frame).unwrap();
        assert_eq!(connector, 1);

        let numbered = json!({"connectorId": 3, "csChargingProfiles": bare.clone()});
        assert_eq!(parse_set_charging_profile(&numbered).unwrap().0, 3);
        assert!(parse_set_charging_profile(&json!({"connectorId": -1, "csChargingProfiles": bare})).is_err());

        assert!(parse_set_charging_profile(&json!({"connectorId": 1})).is_err());
    }
}
