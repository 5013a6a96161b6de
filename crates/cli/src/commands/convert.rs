//! `convert` command implementation.

use anyhow::{Context, Result};
use contracts::isotime::{format_isotime, seconds_between};
use ingestion::load_timing_map;
use serde::Serialize;
use sync_engine::TimingMapService;
use tracing::{debug, info};

use super::{load_config, parse_time};
use crate::cli::ConvertArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct Conversion {
    from: String,
    to: String,
    input: String,
    output: String,
    offset: f64,
    anchor: Option<String>,
}

/// Execute the `convert` command
pub fn run_convert(args: &ConvertArgs) -> Result<()> {
    let timing = load_config(&args.config)?;
    let input = parse_time("TIME", &args.time, timing.timezone)?;

    let (anchors, _) = load_timing_map(&args.tmap)
        .with_context(|| format!("Failed to load timing map {}", args.tmap.display()))?;
    let service = TimingMapService::from_config(anchors, &timing);
    debug!(tmap = %service.to_label(), "Timing map loaded");

    let output = service
        .convert(args.from, args.to, Some(input))
        .ok_or_else(|| CliError::invalid_argument("TIME", "timestamp could not be converted"))?;
    let conversion = Conversion {
        from: args.from.to_string(),
        to: args.to.to_string(),
        input: format_isotime(&input),
        output: format_isotime(&output),
        offset: seconds_between(input, output),
        anchor: service
            .find_anchor(input)
            .and_then(|a| a.mark_id.clone().or_else(|| Some(format_isotime(&a.isotime)))),
    };
    info!(
        from = %conversion.from,
        to = %conversion.to,
        offset = conversion.offset,
        mode = ?service.mode(),
        "Converted timestamp"
    );

    if args.json {
        println!(
            "{}",
            serde_json::to_string(&conversion).context("Failed to serialize conversion")?
        );
    } else {
        println!("{}", conversion.output);
    }
    Ok(())
}
