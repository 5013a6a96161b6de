//! `run` command implementation.

use anyhow::Result;
use dispatcher::SinkTarget;
use tracing::info;

use super::{load_config, pipeline_config, write_records};
use crate::cli::RunArgs;
use crate::pipeline::Pipeline;

/// Execute the `run` command: marks then timing map, written into the session
pub fn run_pipeline(args: &RunArgs) -> Result<()> {
    let timing = load_config(&args.config)?;
    let config = pipeline_config(&args.session, timing)?;

    let marks_target = target_or(&args.marks_out, config.layout.marks_path());
    let tmap_target = target_or(&args.tmap_out, config.layout.tmap_path());
    let mut pipeline = Pipeline::new(config);

    info!("Starting pipeline...");
    let marks = pipeline.generate_marks()?;
    let written = write_records("marks", marks_target, &marks, args.dry_run)?;
    pipeline.record_written(written);

    let anchors = pipeline.build_timing_map(&marks)?;
    let written = write_records("tmap", tmap_target, &anchors, args.dry_run)?;
    pipeline.record_written(written);

    let stats = pipeline.into_stats();
    info!(
        marks = marks.len(),
        anchors = anchors.len(),
        duration_secs = stats.duration().as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();
    Ok(())
}

fn target_or(arg: &Option<String>, default: std::path::PathBuf) -> SinkTarget {
    arg.as_deref()
        .map(SinkTarget::from_arg)
        .unwrap_or(SinkTarget::File(default))
}
