//! `marks` command implementation.

use anyhow::Result;
use dispatcher::SinkTarget;
use tracing::info;

use super::{load_config, pipeline_config, write_records};
use crate::cli::MarksArgs;
use crate::pipeline::Pipeline;

/// Execute the `marks` command
pub fn run_marks(args: &MarksArgs) -> Result<()> {
    let timing = load_config(&args.config)?;
    let mut pipeline = Pipeline::new(pipeline_config(&args.session, timing)?);

    let marks = pipeline.generate_marks()?;
    let written = write_records("marks", SinkTarget::from_arg(&args.output), &marks, args.dry_run)?;
    pipeline.record_written(written);

    info!(marks = marks.len(), output = %args.output, "Marks written");
    pipeline.stats().print_summary();
    Ok(())
}
