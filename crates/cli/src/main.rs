//! # ReproNim Timing CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading, CLI/env overrides and validation
//! - Per-session pipeline orchestration (marks, timing map)
//! - Timestamp conversion and timing map inspection

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::{init_logging, MetricsRecorder, ObservabilityConfig};
use tracing::{info, warn};

use cli::{Cli, Commands};
use commands::{run_convert, run_info, run_marks, run_pipeline, run_tmap, run_validate};

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let logging = ObservabilityConfig {
        log_format: cli.log_format.into(),
        quiet: cli.quiet,
        ..ObservabilityConfig::default()
    }
    .with_verbosity(cli.verbose);
    init_logging(&logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "repronim-timing starting");

    let recorder = match &cli.metrics_out {
        Some(_) => Some(MetricsRecorder::install()?),
        None => None,
    };

    let result = match &cli.command {
        Commands::Marks(args) => run_marks(args),
        Commands::Tmap(args) => run_tmap(args),
        Commands::Run(args) => run_pipeline(args),
        Commands::Convert(args) => run_convert(args),
        Commands::Info(args) => run_info(args),
        Commands::Validate(args) => run_validate(args),
    };

    finish(result, || match (&recorder, &cli.metrics_out) {
        (Some(recorder), Some(path)) => recorder.write_to(path),
        _ => Ok(()),
    })
}

/// Log a command failure, then write metrics. A metrics failure is only a
/// warning and never replaces the command's own result.
fn finish(result: Result<()>, write_metrics: impl FnOnce() -> Result<()>) -> Result<()> {
    if let Err(ref e) = result {
        tracing::error!(error = %format!("{e:#}"), "Command failed");
    }
    if let Err(e) = write_metrics() {
        warn!(error = %format!("{e:#}"), "Failed to write metrics");
    }
    result
}
