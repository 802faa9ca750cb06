#![doc = include_str!("../README.md")]

mod config;
mod herd;
mod telemetry;

use clap::Parser;
use config::{CliArgs, HerdConfig};
use telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = HerdConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let report = herd::run(&config)?;
    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.log();
    }
    Ok(())
}

fn log_startup_info(config: &HerdConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting herd with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting herd of {} callers over {} keys ({:?} mode)",
            config.callers,
            config.keys,
            config.mode
        );
    }
}
