//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::isotime::{format_isotime, seconds_between};
use ingestion::load_timing_map;
use observability::{RunSummary, StatsSummary};
use serde::Serialize;
use sync_engine::TimingMapService;
use tracing::info;

use crate::cli::InfoArgs;

/// Timing map info for JSON output
#[derive(Serialize)]
struct TmapInfo {
    path: String,
    label: String,
    anchors: usize,
    malformed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
    span_s: f64,
    clocks: BTreeMap<String, ClockInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rows: Vec<AnchorRow>,
}

#[derive(Serialize)]
struct ClockInfo {
    anchors: u64,
    offset_min: f64,
    offset_max: f64,
    offset_mean: f64,
    offset_std: f64,
}

#[derive(Serialize)]
struct AnchorRow {
    isotime: String,
    mark: Option<String>,
    offsets: BTreeMap<String, Option<f64>>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(tmap = %args.tmap.display(), "Loading timing map info");

    let (anchors, read) = load_timing_map(&args.tmap)
        .with_context(|| format!("Failed to load timing map {}", args.tmap.display()))?;
    let service = TimingMapService::new(anchors);

    let tmap_info = build_info(&service, args, read.malformed);
    if args.json {
        let json = serde_json::to_string_pretty(&tmap_info)
            .context("Failed to serialize timing map info")?;
        println!("{}", json);
    } else {
        print_info(&tmap_info);
    }
    Ok(())
}

fn build_info(service: &TimingMapService, args: &InfoArgs, malformed: usize) -> TmapInfo {
    let anchors = service.anchors();
    let mut summary = RunSummary::default();
    summary.record_anchors(anchors, args.reference);

    let clocks = summary
        .offsets
        .iter()
        .map(|(clock, stats)| {
            let s = StatsSummary::from(stats);
            (
                clock.to_string(),
                ClockInfo {
                    anchors: s.count,
                    offset_min: s.min,
                    offset_max: s.max,
                    offset_mean: s.mean,
                    offset_std: s.std_dev,
                },
            )
        })
        .collect();

    let rows = if args.anchors {
        anchors
            .iter()
            .map(|a| AnchorRow {
                isotime: format_isotime(&a.isotime),
                mark: a.mark_name.clone().or_else(|| a.mark_id.clone()),
                offsets: a
                    .clocks
                    .iter()
                    .map(|(clock, values)| (clock.to_string(), values.offset))
                    .collect(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let (first, last) = (anchors.first(), anchors.last());
    TmapInfo {
        path: args.tmap.display().to_string(),
        label: service.to_label(),
        anchors: anchors.len(),
        malformed,
        start: first.map(|a| format_isotime(&a.isotime)),
        end: last.map(|a| format_isotime(&a.isotime)),
        span_s: match (first, last) {
            (Some(a), Some(b)) => seconds_between(a.isotime, b.isotime),
            _ => 0.0,
        },
        clocks,
        rows,
    }
}

fn print_info(info: &TmapInfo) {
    println!("Timing map: {}", info.path);
    println!("  Anchors: {} (malformed lines: {})", info.anchors, info.malformed);
    if let (Some(start), Some(end)) = (&info.start, &info.end) {
        println!("  Range: {start} .. {end} ({:.3}s)", info.span_s);
    }
    for (clock, c) in &info.clocks {
        println!(
            "  {clock}: offset mean={:.6}s min={:.6}s max={:.6}s std={:.6}s (n={})",
            c.offset_mean, c.offset_min, c.offset_max, c.offset_std, c.anchors
        );
    }
    for row in &info.rows {
        let offsets = row
            .offsets
            .iter()
            .map(|(clock, offset)| match offset {
                Some(o) => format!("{clock}={o:.6}"),
                None => format!("{clock}=-"),
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "  {} [{}] {offsets}",
            row.isotime,
            row.mark.as_deref().unwrap_or("-")
        );
    }
    println!("  {}", info.label);
}
