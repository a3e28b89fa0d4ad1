//! # OCPP CLI Application
//!
//! Load-tests an OCPP 1.6J Central System with simulated charge points, runs
//! single sessions, and evaluates charging profiles offline.

use anyhow::Result;
use clap::Parser;
use ocpp_cli::commands::{perf_command, schedule_command, session_command};
use ocpp_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Perf(args) => perf_command(args).await,
        Commands::Session(args) => session_command(args).await,
        Commands::Schedule(args) => schedule_command(args).await,
    }
}
