//! # Command Line Arguments
//!
//! Flags override values from the configuration file and `OCPP_PERF_*`
//! environment variables.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ocpp_loadtest::LoadTestConfig;
use ocpp_types::v16j::ChargingRateUnitType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ocpp-cli")]
#[command(about = "OCPP 1.6J charge point load simulator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run many charge point sessions against a Central System
    Perf(PerfArgs),
    /// Run one charge point session until Ctrl-C
    Session(SessionArgs),
    /// Evaluate a charging profile file offline
    Schedule(ScheduleArgs),
}

/// Options shared by commands that talk to a Central System
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Central System base URL; the charge point id is appended
    #[arg(short, long)]
    pub url: Option<String>,

    /// WebSocket sub-protocol
    #[arg(long)]
    pub proto: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Use the URL as given instead of appending the charge point id
    #[arg(long)]
    pub no_append_cp_id: bool,

    /// Log full OCPP payloads
    #[arg(long)]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Verbose log output
    #[arg(short, long)]
    pub verbose: bool,
}

impl TargetArgs {
    pub fn apply_to(&self, config: &mut LoadTestConfig) {
        if let Some(url) = &self.url {
            config.target.url = url.clone();
        }
        if let Some(proto) = &self.proto {
            config.target.sub_protocol = proto.clone();
        }
        if self.insecure {
            config.target.insecure = true;
        }
        if self.no_append_cp_id {
            config.target.append_cp_id = false;
        }
        if self.debug {
            config.session.debug_payloads = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.verbose {
            config.logging.verbose = true;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PerfArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Roster CSV with one `cpId,idTag` pair per line
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Number of sessions to run (capped by the roster size)
    #[arg(long)]
    pub total: Option<usize>,

    /// Maximum sessions in flight
    #[arg(long)]
    pub concurrent: Option<usize>,

    /// Delay between launches in milliseconds
    #[arg(long)]
    pub ramp: Option<u64>,

    /// Seconds to charge before StopTransaction (0 means 10)
    #[arg(long)]
    pub hold: Option<u64>,

    /// MeterValues period in seconds (0 disables)
    #[arg(long)]
    pub mv: Option<u64>,

    /// Skip Authorize
    #[arg(long)]
    pub no_auth: bool,

    /// Skip StartTransaction
    #[arg(long)]
    pub no_start: bool,

    /// Never send StopTransaction
    #[arg(long)]
    pub no_stop: bool,

    /// Keep roster rows whose charge point id matches this regex
    #[arg(long)]
    pub grep: Option<String>,

    /// Roster rows to skip after filtering
    #[arg(long)]
    pub offset: Option<usize>,

    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl PerfArgs {
    pub fn apply_to(&self, config: &mut LoadTestConfig) {
        self.target.apply_to(config);
        if let Some(csv) = &self.csv {
            config.roster.csv_path = Some(csv.clone());
        }
        if let Some(total) = self.total {
            config.load.total_sessions = total;
        }
        if let Some(concurrent) = self.concurrent {
            config.load.max_concurrent = concurrent;
        }
        if let Some(ramp) = self.ramp {
            config.load.ramp_delay_ms = ramp;
        }
        if let Some(hold) = self.hold {
            config.session.hold_secs = hold;
        }
        if let Some(mv) = self.mv {
            config.session.meter_interval_secs = mv;
        }
        if self.no_auth {
            config.session.no_auth = true;
        }
        if self.no_start {
            config.session.no_start = true;
        }
        if self.no_stop {
            config.session.no_stop = true;
        }
        if let Some(grep) = &self.grep {
            config.roster.grep = Some(grep.clone());
        }
        if let Some(offset) = self.offset {
            config.roster.offset = offset;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Charge point id
    #[arg(long, default_value = "CP001")]
    pub cp_id: String,

    /// Id tag presented for Authorize and StartTransaction
    #[arg(long, default_value = ocpp_loadtest::DEFAULT_ID_TAG)]
    pub id_tag: String,

    /// Stop the transaction after this many seconds instead of at Ctrl-C
    #[arg(long)]
    pub hold: Option<u64>,

    /// MeterValues period in seconds (0 disables)
    #[arg(long)]
    pub mv: Option<u64>,

    /// Skip Authorize
    #[arg(long)]
    pub no_auth: bool,

    /// Send StatusNotification on state changes
    #[arg(long)]
    pub status_notifications: bool,

    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl SessionArgs {
    pub fn apply_to(&self, config: &mut LoadTestConfig) {
        self.target.apply_to(config);
        match self.hold {
            Some(hold) => {
                config.session.hold_secs = hold;
                config.session.no_stop = false;
            }
            None => config.session.no_stop = true,
        }
        if let Some(mv) = self.mv {
            config.session.meter_interval_secs = mv;
        }
        if self.no_auth {
            config.session.no_auth = true;
        }
        if self.status_notifications {
            config.session.status_notifications = true;
        }
    }
}

/// Unit for the composite schedule
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    W,
    A,
}

impl From<RateUnit> for ChargingRateUnitType {
    fn from(unit: RateUnit) -> Self {
        match unit {
            RateUnit::W => ChargingRateUnitType::W,
            RateUnit::A => ChargingRateUnitType::A,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// SetChargingProfile payload, full CALL frame, bare profile, or a JSON
    /// array of those
    #[arg(short, long)]
    pub profile: PathBuf,

    /// Evaluation instant (RFC 3339), defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    pub at: Option<DateTime<Utc>>,

    /// Composite schedule window in seconds
    #[arg(short, long, default_value_t = 86_400)]
    pub duration: i64,

    /// Composite schedule unit
    #[arg(long, value_enum, default_value_t = RateUnit::W)]
    pub unit: RateUnit,

    /// Transaction start (RFC 3339) used by relative profiles
    #[arg(long, value_parser = parse_timestamp)]
    pub tx_start: Option<DateTime<Utc>>,

    /// Line voltage
    #[arg(long, default_value_t = 230.0)]
    pub voltage: f64,

    /// Phases in use
    #[arg(long, default_value_t = 1)]
    pub phases: u32,

    /// Connector maximum in watts
    #[arg(long, default_value_t = 22_000.0)]
    pub max_power: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("'{value}' is not an RFC 3339 timestamp: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_perf_flags_override_config() {
        let Commands::Perf(args) = parse(&[
            "ocpp-cli",
            "perf",
            "--url",
            "ws://csms:9000/ocpp",
            "--csv",
            "cps.csv",
            "--total",
            "100",
            "--concurrent",
            "10",
            "--ramp",
            "50",
            "--hold",
            "30",
            "--mv",
            "5",
            "--no-auth",
            "--no-append-cp-id",
            "--grep",
            "^CP",
            "--offset",
            "3",
        ]) else {
            panic!("expected perf");
        };

        let mut config = LoadTestConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.target.url, "ws://csms:9000/ocpp");
        assert_eq!(config.roster.csv_path, Some(PathBuf::from("cps.csv")));
        assert_eq!(config.load.total_sessions, 100);
        assert_eq!(config.load.max_concurrent, 10);
        assert_eq!(config.load.ramp_delay_ms, 50);
        assert_eq!(config.session.hold_secs, 30);
        assert_eq!(config.session.meter_interval_secs, 5);
        assert!(config.session.no_auth);
        assert!(!config.session.no_start);
        assert!(!config.target.append_cp_id);
        assert_eq!(config.roster.grep.as_deref(), Some("^CP"));
        assert_eq!(config.roster.offset, 3);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let Commands::Perf(args) = parse(&["ocpp-cli", "perf"]) else {
            panic!("expected perf");
        };
        let mut config = LoadTestConfig::default();
        config.load.max_concurrent = 7;
        config.target.insecure = true;
        args.apply_to(&mut config);
        assert_eq!(config.load.max_concurrent, 7);
        assert!(config.target.insecure);
    }

    #[test]
    fn test_session_runs_until_interrupted_without_hold() {
        let Commands::Session(args) = parse(&["ocpp-cli", "session", "--cp-id", "CP042"]) else {
            panic!("expected session");
        };
        assert_eq!(args.id_tag, "TEST-TAG");
        let mut config = LoadTestConfig::default();
        args.apply_to(&mut config);
        assert!(config.session.no_stop);

        let Commands::Session(args) = parse(&["ocpp-cli", "session", "--hold", "60"]) else {
            panic!("expected session");
        };
        args.apply_to(&mut config);
        assert!(!config.session.no_stop);
        assert_eq!(config.session.hold_secs, 60);
    }

    #[test]
    fn test_schedule_arguments() {
        let Commands::Schedule(args) = parse(&[
            "ocpp-cli",
            "schedule",
            "--profile",
            "profile.json",
            "--at",
            "2024-03-01T12:00:00Z",
            "--unit",
            "a",
        ]) else {
            panic!("expected schedule");
        };
        assert_eq!(args.duration, 86_400);
        assert_eq!(args.unit, RateUnit::A);
        assert_eq!(
            args.at.map(|at| at.to_rfc3339()),
            Some("2024-03-01T12:00:00+00:00".to_string())
        );

        assert!(Cli::try_parse_from(["ocpp-cli", "schedule", "--profile", "p.json", "--at", "noon"]).is_err());
    }
}
