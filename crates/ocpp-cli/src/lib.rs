//! # OCPP CLI Library
//!
//! Argument parsing, command runners and terminal output for the
//! `ocpp-cli` binary.

pub mod cli;
pub mod commands;
pub mod ui;

pub use cli::{Cli, Commands};

/// Utility functions
pub mod utils {
    use anyhow::Result;
    use ocpp_loadtest::config::LoggingConfig;

    /// Map a level name to a tracing level, `info` for anything unknown
    pub fn parse_level(level: &str) -> tracing::Level {
        match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Install the global subscriber. `RUST_LOG` directives are honoured on
    /// top of the configured level.
    pub fn init_logging(config: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = parse_level(&config.level);
        let registry = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()));

        if config.verbose {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()?;
        }

        Ok(())
    }
}
