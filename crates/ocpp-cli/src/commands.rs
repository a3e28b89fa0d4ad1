//! # CLI Commands
//!
//! `perf`, `session` and `schedule` runners.

use crate::cli::{PerfArgs, ScheduleArgs, SessionArgs};
use crate::ui;
use crate::utils::init_logging;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use ocpp_cp::Session;
use ocpp_loadtest::config::LoggingConfig;
use ocpp_loadtest::{load_roster, LoadOrchestrator, LoadTestConfig};
use ocpp_messages::v16j::GetCompositeScheduleResponse;
use ocpp_smart_charging::profile::parse_set_charging_profile;
use ocpp_smart_charging::{composite_schedule, ChargingProfileStore, ConnectorConfig, EffectiveLimit};
use ocpp_transport::{Dialer, WebSocketDialer};
use ocpp_types::v16j::{ChargingProfile, ChargingProfileStatus, ChargingRateUnitType};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Build the effective configuration: file, then environment, then flags
fn load_config(path: Option<&Path>, apply_flags: impl FnOnce(&mut LoadTestConfig)) -> Result<LoadTestConfig> {
    let mut config = match path {
        Some(path) => LoadTestConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => LoadTestConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("reading OCPP_PERF_* environment variables")?;
    apply_flags(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub async fn perf_command(args: PerfArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), |config| args.apply_to(config))?;
    init_logging(&config.logging)?;

    let Some(csv) = config.roster.csv_path.clone() else {
        bail!("no roster given; pass --csv or set roster.csv_path");
    };
    let roster = load_roster(&csv, &config.roster_filter())
        .with_context(|| format!("loading roster {}", csv.display()))?;
    if roster.is_empty() {
        bail!("roster {} has no usable rows", csv.display());
    }

    ui::print_perf_banner(&config, roster.len());
    let dialer: Arc<dyn Dialer> = Arc::new(WebSocketDialer::new(config.transport_config()));
    let orchestrator = LoadOrchestrator::start(config.load_plan(), roster, dialer);

    let pb = ui::progress_line()?;
    let mut ticker = tokio::time::interval(ui::PROGRESS_INTERVAL);
    let mut interrupted = false;
    while !orchestrator.is_finished() {
        tokio::select! {
            _ = ticker.tick() => pb.set_message(orchestrator.status().to_string()),
            result = tokio::signal::ctrl_c(), if !interrupted => {
                result.context("listening for Ctrl-C")?;
                interrupted = true;
                pb.println(format!("🛑 {} received, stopping sessions", "Ctrl+C".yellow()));
                orchestrator.stop();
            }
        }
    }
    pb.finish_and_clear();

    let outcome = orchestrator.wait().await?;
    ui::print_summary(&outcome.stats);
    Ok(())
}

pub async fn session_command(args: SessionArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), |config| args.apply_to(config))?;
    init_logging(&config.logging)?;

    let dialer: Arc<dyn Dialer> = Arc::new(WebSocketDialer::new(config.transport_config()));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session = Session::new(
        args.cp_id.clone(),
        args.id_tag.clone(),
        config.session_config(),
        dialer,
    )
    .with_events(events_tx)
    .with_shutdown(shutdown_rx);
    let mut limits = session.subscribe_limits();

    println!(
        "{} {} → {}",
        "OCPP Session".bright_cyan().bold(),
        args.cp_id.bright_yellow(),
        config.target.url.bright_white()
    );
    println!("Press Ctrl+C to stop");
    let handle = tokio::spawn(session.run());

    let mut shown: BTreeMap<u32, f64> = BTreeMap::new();
    let mut limits_open = true;
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(line) = ui::format_event(&event) {
                        println!("{line}");
                    }
                }
                None => break,
            },
            changed = limits.changed(), if limits_open => match changed {
                Ok(()) => {
                    let current = limits.borrow_and_update().clone();
                    for (connector, limit_w) in current {
                        if shown.insert(connector, limit_w) != Some(limit_w) {
                            println!("{}", ui::format_limit_change(connector, limit_w));
                        }
                    }
                }
                Err(_) => limits_open = false,
            },
            result = tokio::signal::ctrl_c(), if !interrupted => {
                result.context("listening for Ctrl-C")?;
                interrupted = true;
                println!("\n🛑 {} received, stopping session", "Ctrl+C".yellow());
                shutdown_tx.send_replace(true);
            }
        }
    }

    let report = handle.await.context("session task failed")?;
    ui::print_report(&report);
    Ok(())
}

/// One profile installed by the offline evaluator
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledProfile {
    pub connector: u32,
    pub profile_id: i32,
    pub status: ChargingProfileStatus,
}

/// Limit and composite schedule of one connector
#[derive(Debug, Clone)]
pub struct ConnectorSchedule {
    pub connector: u32,
    pub limit: EffectiveLimit,
    pub composite: GetCompositeScheduleResponse,
}

#[derive(Debug, Clone)]
pub struct ScheduleEvaluation {
    pub installed: Vec<InstalledProfile>,
    pub connectors: Vec<ConnectorSchedule>,
}

/// Inputs of the offline evaluator
#[derive(Debug, Clone, Copy)]
pub struct EvaluationParams {
    pub at: DateTime<Utc>,
    pub tx_start: Option<DateTime<Utc>>,
    pub duration: i64,
    pub unit: ChargingRateUnitType,
    pub connector: ConnectorConfig,
}

/// A file holds one SetChargingProfile payload, frame or bare profile, or a
/// JSON array of them
fn profile_payloads(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) if items.first().map_or(false, Value::is_object) => items,
        other => vec![other],
    }
}

/// Install every profile in `document` into a fresh store and evaluate the
/// connectors they target
pub fn evaluate_profiles(document: Value, params: EvaluationParams) -> Result<ScheduleEvaluation> {
    let parsed: Vec<(u32, ChargingProfile)> = profile_payloads(document)
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            parse_set_charging_profile(payload).with_context(|| format!("profile entry {index}"))
        })
        .collect::<Result<_>>()?;

    let mut store = ChargingProfileStore::new(params.connector);
    let connectors: BTreeSet<u32> = parsed.iter().map(|(connector, _)| *connector).collect();
    for connector in &connectors {
        store.configure_connector(*connector, params.connector);
        if let Some(tx_start) = params.tx_start {
            store.mark_transaction_start(*connector, tx_start);
        }
    }

    let installed = parsed
        .into_iter()
        .map(|(connector, profile)| {
            let profile_id = profile.charging_profile_id;
            let status = store.install(connector, profile, params.at);
            InstalledProfile {
                connector,
                profile_id,
                status,
            }
        })
        .collect();

    let connectors = connectors
        .into_iter()
        .map(|connector| ConnectorSchedule {
            connector,
            limit: store.effective_limit(connector, params.at),
            composite: composite_schedule(
                &store,
                connector,
                params.duration,
                Some(params.unit),
                params.at,
            ),
        })
        .collect();
    store.reset();

    Ok(ScheduleEvaluation {
        installed,
        connectors,
    })
}

pub async fn schedule_command(args: ScheduleArgs) -> Result<()> {
    init_logging(&LoggingConfig {
        level: args.log_level.clone(),
        verbose: false,
    })?;

    let text = std::fs::read_to_string(&args.profile)
        .with_context(|| format!("reading {}", args.profile.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", args.profile.display()))?;

    let params = EvaluationParams {
        at: args.at.unwrap_or_else(Utc::now),
        tx_start: args.tx_start,
        duration: args.duration,
        unit: args.unit.into(),
        connector: ConnectorConfig {
            voltage: args.voltage,
            phases: args.phases,
            max_power_w: args.max_power,
        },
    };
    info!("Evaluating {} at {}", args.profile.display(), params.at);
    let evaluation = evaluate_profiles(document, params)?;

    println!("{} at {}", "Charging Schedule".bright_cyan().bold(), params.at.to_rfc3339());
    for installed in &evaluation.installed {
        let status = match installed.status {
            ChargingProfileStatus::Accepted => format!("{:?}", installed.status).green(),
            _ => format!("{:?}", installed.status).red(),
        };
        println!(
            "   Profile #{} on connector {}: {}",
            installed.profile_id, installed.connector, status
        );
    }
    for schedule in &evaluation.connectors {
        println!("{}", ui::format_effective_limit(schedule.connector, &schedule.limit));
        println!("{}", serde_json::to_string_pretty(&schedule.composite)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ocpp_smart_charging::LimitSource;
    use ocpp_types::v16j::GetCompositeScheduleStatus;
    use serde_json::json;

    fn params(at: DateTime<Utc>) -> EvaluationParams {
        EvaluationParams {
            at,
            tx_start: None,
            duration: 7200,
            unit: ChargingRateUnitType::W,
            connector: ConnectorConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_daily_profile_applies_in_first_hour() {
        let document = json!({
            "connectorId": 1,
            "csChargingProfiles": {
                "chargingProfileId": 1,
                "stackLevel": 0,
                "chargingProfilePurpose": "TxDefaultProfile",
                "chargingProfileKind": "Recurring",
                "recurrencyKind": "Daily",
                "chargingSchedule": {
                    "duration": 3600,
                    "startSchedule": "2024-03-01T00:00:00Z",
                    "chargingRateUnit": "W",
                    "chargingSchedulePeriod": [{"startPeriod": 0, "limit": 10000}]
                }
            }
        });
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 0, 30, 0).unwrap();

        let evaluation = evaluate_profiles(document, params(at)).unwrap();
        assert_eq!(
            evaluation.installed,
            vec![InstalledProfile {
                connector: 1,
                profile_id: 1,
                status: ChargingProfileStatus::Accepted
            }]
        );

        let schedule = &evaluation.connectors[0];
        assert_eq!(schedule.limit.limit_w, 10000.0);
        assert_eq!(schedule.limit.source, LimitSource::Profile);
        assert_eq!(schedule.composite.status, GetCompositeScheduleStatus::Accepted);
        let periods = &schedule.composite.charging_schedule.as_ref().unwrap().charging_schedule_period;
        assert_eq!(periods.len(), 2);
        assert_eq!((periods[0].start_period, periods[0].limit), (0, 10000.0));
        assert_eq!((periods[1].start_period, periods[1].limit), (1801, 22000.0));
    }

    #[tokio::test]
    async fn test_profile_list_stacks_by_purpose() {
        let document = json!([
            {
                "connectorId": 1,
                "csChargingProfiles": {
                    "chargingProfileId": 10,
                    "stackLevel": 0,
                    "chargingProfilePurpose": "TxDefaultProfile",
                    "chargingProfileKind": "Absolute",
                    "chargingSchedule": {
                        "chargingRateUnit": "W",
                        "chargingSchedulePeriod": [{"startPeriod": 0, "limit": 5000}]
                    }
                }
            },
            {
                "connectorId": 1,
                "csChargingProfiles": {
                    "chargingProfileId": 11,
                    "stackLevel": 0,
                    "chargingProfilePurpose": "TxProfile",
                    "chargingProfileKind": "Absolute",
                    "chargingSchedule": {
                        "chargingRateUnit": "W",
                        "chargingSchedulePeriod": [{"startPeriod": 0, "limit": 11000}]
                    }
                }
            }
        ]);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut params = params(at);
        params.tx_start = Some(at);

        let evaluation = evaluate_profiles(document, params).unwrap();
        assert_eq!(evaluation.installed.len(), 2);
        assert_eq!(evaluation.connectors.len(), 1);
        assert_eq!(evaluation.connectors[0].limit.limit_w, 11000.0);
        assert_eq!(evaluation.connectors[0].limit.profile_id, Some(11));
    }

    #[tokio::test]
    async fn test_invalid_entry_is_reported() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let error = evaluate_profiles(json!([{"connectorId": 1}]), params(at)).unwrap_err();
        assert!(error.to_string().contains("profile entry 0"));
    }

    #[test]
    fn test_frames_are_not_mistaken_for_lists() {
        let frame = json!([2, "m-1", "SetChargingProfile", {}]);
        assert_eq!(profile_payloads(frame).len(), 1);
        assert_eq!(profile_payloads(json!([{}, {}])).len(), 2);
    }
}
