//! # Terminal Output
//!
//! Progress line, banners and result formatting.

use anyhow::Result;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use ocpp_cp::{SessionEvent, SessionReport, SessionState};
use ocpp_loadtest::{LoadTestConfig, StatsSnapshot};
use ocpp_smart_charging::EffectiveLimit;
use std::time::Duration;

/// How often the progress line is refreshed
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

const RULE: &str = "────────────────────────────────────────";

/// Spinner that carries the live counters as its message
pub fn progress_line() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

pub fn print_perf_banner(config: &LoadTestConfig, roster_size: usize) {
    println!("{}", "OCPP Load Test".bright_cyan().bold());
    println!("{RULE}");
    println!("   Target:      {}", config.target.url.bright_white());
    println!("   Protocol:    {}", config.target.sub_protocol);
    println!(
        "   Sessions:    {} of {} roster rows",
        config.load.total_sessions.min(roster_size).to_string().bright_yellow(),
        roster_size
    );
    println!(
        "   Concurrency: {} (ramp {}ms)",
        config.load.max_concurrent.to_string().bright_yellow(),
        config.load.ramp_delay_ms
    );
    println!("   Hold:        {}", format_duration(config.session_config().hold()));
    println!("{RULE}");
}

/// Final counters followed by the completion marker
pub fn print_summary(stats: &StatsSnapshot) {
    println!("{RULE}");
    let line = stats.to_string();
    if stats.errors > 0 {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.green());
    }
    println!("Peak concurrency: {}", stats.peak);
    println!("{}", "DONE".bright_green().bold());
}

/// One line per session event, `None` for events not worth showing
pub fn format_event(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::Launched { .. } => return None,
        SessionEvent::Connected { cp_id } => format!("🟢 [{}] {}", cp_id, "connected".green()),
        SessionEvent::Latency { phase, millis } => format!("⏱  {:?} answered in {}ms", phase, millis),
        SessionEvent::TransactionStarted {
            cp_id,
            transaction_id,
        } => format!(
            "⚡ [{}] transaction {} started",
            cp_id,
            transaction_id.to_string().bright_yellow()
        ),
        SessionEvent::Error { cp_id, category } => {
            format!("❌ [{}] {} error", cp_id, category.to_string().red())
        }
        SessionEvent::Finished { cp_id, state, .. } => {
            format!("📴 [{}] finished in state {}", cp_id, format_state(*state))
        }
    };
    Some(line)
}

pub fn format_state(state: SessionState) -> ColoredString {
    match state {
        SessionState::Closed => state.to_string().green(),
        SessionState::Error => state.to_string().red(),
        _ => state.to_string().yellow(),
    }
}

pub fn format_limit_change(connector: u32, limit_w: f64) -> String {
    format!("🔌 Connector {} limit now {:.0} W", connector, limit_w)
}

pub fn print_report(report: &SessionReport) {
    println!("{RULE}");
    println!("Session {}: {}", report.cp_id.bright_white(), format_state(report.final_state));
    if let Some(transaction_id) = report.transaction_id {
        println!("   Transaction: {}", transaction_id);
    }
    println!("   Energy:      {:.1} Wh", report.energy_wh);
    println!("   Errors:      {}", report.errors);
    if let Some(failure) = &report.failure {
        println!("   Failure:     {}", failure.to_string().red());
    }
}

pub fn format_effective_limit(connector: u32, limit: &EffectiveLimit) -> String {
    let mut line = format!(
        "Connector {}: {:.0} W ({:?}",
        connector, limit.limit_w, limit.source
    );
    if let Some(profile_id) = limit.profile_id {
        line.push_str(&format!(", profile #{}", profile_id));
    }
    if let Some(stack_level) = limit.stack_level {
        line.push_str(&format!(", stack {}", stack_level));
    }
    line.push(')');
    if let Some(next) = limit.next_change_in_sec {
        line.push_str(&format!(", changes in {}", format_duration(Duration::from_secs(next))));
    }
    line
}

/// `1h 1m 1s` style durations
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ocpp_smart_charging::LimitSource;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_launch_events_are_silent() {
        let event = SessionEvent::Launched {
            cp_id: "CP1".to_string(),
        };
        assert!(format_event(&event).is_none());

        let event = SessionEvent::TransactionStarted {
            cp_id: "CP1".to_string(),
            transaction_id: 77,
        };
        let line = format_event(&event).unwrap();
        assert!(line.contains("[CP1]"));
        assert!(line.contains("77"));
    }

    #[test]
    fn test_effective_limit_line() {
        let limit = EffectiveLimit {
            limit_w: 7400.0,
            source: LimitSource::Profile,
            profile_id: Some(3),
            purpose: None,
            stack_level: Some(1),
            computed_at: Utc::now(),
            next_change_in_sec: Some(90),
        };
        assert_eq!(
            format_effective_limit(1, &limit),
            "Connector 1: 7400 W (Profile, profile #3, stack 1), changes in 1m 30s"
        );
    }

    #[test]
    fn test_progress_line_builds() {
        let pb = progress_line().unwrap();
        pb.set_message("Launched:0");
        pb.finish_and_clear();
    }
}
