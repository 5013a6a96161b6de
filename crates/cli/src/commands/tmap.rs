//! `tmap` command implementation.

use anyhow::{Context, Result};
use contracts::ContractError;
use dispatcher::SinkTarget;
use ingestion::load_marks;
use tracing::info;

use super::{load_config, open_session, write_records};
use crate::cli::TmapArgs;
use crate::pipeline::{Pipeline, PipelineConfig, RangeSource};

/// Execute the `tmap` command
pub fn run_tmap(args: &TmapArgs) -> Result<()> {
    let timing = load_config(&args.config)?;

    let layout = match &args.session {
        Some(session) => open_session(session)?,
        None => ingestion::SessionLayout::new("."),
    };
    let marks_path = args.marks.clone().unwrap_or_else(|| layout.marks_path());

    let (marks, read) = load_marks(&marks_path)
        .with_context(|| format!("Failed to load marks from {}", marks_path.display()))?;
    if marks.is_empty() {
        return Err(ContractError::missing_data(
            marks_path.display().to_string(),
            "no marks to build a timing map from",
        )
        .into());
    }
    info!(marks = marks.len(), malformed = read.malformed, "Marks loaded");

    let mut pipeline = Pipeline::new(PipelineConfig {
        timing,
        layout,
        range: RangeSource::None,
        tmap_in: None,
    });
    let anchors = pipeline.build_timing_map(&marks)?;
    let target = SinkTarget::from_arg(&args.output);
    let written = write_records("tmap", target, &anchors, args.dry_run)?;
    pipeline.record_written(written);

    info!(anchors = anchors.len(), output = %args.output, "Timing map written");
    pipeline.stats().print_summary();
    Ok(())
}
