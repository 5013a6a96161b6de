//! Command implementations.

mod convert;
mod info;
mod marks;
mod run;
mod tmap;
mod validate;

pub use convert::run_convert;
pub use info::run_info;
pub use marks::run_marks;
pub use run::run_pipeline;
pub use tmap::run_tmap;
pub use validate::run_validate;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use contracts::isotime::parse_isotime_in;
use contracts::{Clock, TimingConfig};
use dispatcher::{create_dispatcher, SinkTarget};
use ingestion::{SessionLayout, StudyRange};
use serde::Serialize;
use tracing::info;

use crate::cli::{ConfigArgs, SessionArgs};
use crate::error::CliError;
use crate::pipeline::{PipelineConfig, RangeSource};

/// Load the configuration file (or defaults) and apply CLI overrides
pub(crate) fn load_config(args: &ConfigArgs) -> Result<TimingConfig> {
    if let Some(path) = &args.config {
        if !path.exists() {
            return Err(CliError::config_not_found(path).into());
        }
        info!(config = %path.display(), "Loading configuration");
    }

    let mut config = config_loader::ConfigLoader::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(reference) = args.reference {
        info!(reference = %reference, "Overriding reference clock from CLI");
        config.reference_clock = reference;
    }
    if !args.skip_clocks.is_empty() {
        config.skip_clocks = args.skip_clocks.clone();
    }
    if args.loose {
        config.marks.loose_matching = true;
    }
    if let Some(selection) = args.selection {
        config.timing_map.selection = selection.into();
    }
    if let Some(tz) = args.timezone {
        config.timezone = tz;
    }
    if let Some(mode) = args.conversion {
        config.conversion.mode = mode.into();
    }

    config_loader::ConfigLoader::validate(&config)
        .context("Invalid configuration after CLI overrides")?;
    Ok(config)
}

pub(crate) fn parse_time(name: &str, value: &str, tz: Tz) -> Result<NaiveDateTime, CliError> {
    parse_isotime_in(value, tz).map_err(|e| CliError::invalid_argument(name, e.to_string()))
}

pub(crate) fn open_session(path: &std::path::Path) -> Result<SessionLayout, CliError> {
    SessionLayout::open(path).map_err(|_| CliError::session_not_found(path))
}

/// Pipeline configuration from session arguments
pub(crate) fn pipeline_config(
    session: &SessionArgs,
    timing: TimingConfig,
) -> Result<PipelineConfig> {
    let layout = open_session(&session.session)?;

    let range = match (&session.range_start, &session.range_end, &session.study) {
        (Some(start), Some(end), _) => RangeSource::Explicit {
            range: StudyRange::new(
                parse_time("--range-start", start, timing.timezone)?,
                parse_time("--range-end", end, timing.timezone)?,
            ),
            clock: session.range_clock.unwrap_or(timing.reference_clock),
        },
        (_, _, Some(name)) => RangeSource::Study { name: name.clone() },
        _ => RangeSource::None,
    };

    Ok(PipelineConfig {
        timing,
        layout,
        range,
        tmap_in: session.tmap_in.clone(),
    })
}

/// Write records to `target` (or log them on a dry run); returns the count
pub(crate) fn write_records<T: Serialize>(
    name: &str,
    target: SinkTarget,
    records: &[T],
    dry_run: bool,
) -> Result<u64> {
    let target = if dry_run { SinkTarget::Log } else { target };
    let mut dispatcher = create_dispatcher(name, &[target])
        .with_context(|| format!("Failed to open {name} output"))?;
    dispatcher.dispatch(records)?;
    let metrics = dispatcher
        .finish()
        .map_err(|e| CliError::pipeline_execution(name, e.to_string()))?;
    Ok(metrics.iter().map(|(_, m)| m.write_count).max().unwrap_or(0))
}

/// Clock list for display, e.g. `birch, dicoms`
pub(crate) fn clock_list(clocks: &[Clock]) -> String {
    clocks.iter().map(Clock::as_str).collect::<Vec<_>>().join(", ")
}
