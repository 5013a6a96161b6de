//! # Observability
//!
//! Tracing subscriber setup, metrics recorder and run summary.
//!
//! ## Features
//!
//! - Tracing initialization (JSON/Pretty/Compact), always on stderr
//! - Prometheus text exposition rendered to a file at the end of a run
//! - `RunSummary` aggregation of per-stage counters and anchor offsets
//!
//! ## Usage
//!
//! ```ignore
//! use observability::{init_logging, MetricsRecorder, ObservabilityConfig};
//!
//! init_logging(&ObservabilityConfig::default())?;
//! let recorder = MetricsRecorder::install()?;
//! // ... run the pipeline ...
//! recorder.write_to(Path::new("metrics.prom"))?;
//! ```

pub mod metrics;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{record_stage_duration, RunSummary, RunningStats, StatsSummary};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Level used when `RUST_LOG` is not set
    pub default_log_level: String,
    /// Only warnings and errors; overrides `RUST_LOG`
    pub quiet: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            default_log_level: "info".to_string(),
            quiet: false,
        }
    }
}

impl ObservabilityConfig {
    /// Default level for a `-v` count: 0 info, 1 debug, 2+ trace
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.default_log_level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string();
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human readable
    #[default]
    Pretty,
    /// Compact single line
    Compact,
}

/// Install the global tracing subscriber. Logs go to stderr so stdout stays
/// free for records.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(log_format = ?config.log_format, "Logging initialized");
    Ok(())
}

/// Global Prometheus recorder without an HTTP listener
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Install as the global `metrics` recorder
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        tracing::debug!("Prometheus recorder installed");
        Ok(Self { handle })
    }

    /// Current text exposition
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the text exposition to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Metrics written");
        Ok(())
    }
}
