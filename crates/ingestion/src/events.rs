//! Event stream loading
//!
//! A dump file may interleave non-event summary records (`StudyRecord`,
//! `SeriesRecord`); those are skipped quietly. Everything else must carry an
//! `id` and an `isotime` to become an [`Event`]. Offset-aware `isotime`
//! values are brought into the session time zone first.

use std::collections::HashSet;
use std::path::Path;

use chrono_tz::Tz;
use contracts::isotime::{format_isotime, parse_isotime_in};
use contracts::{Clock, ContractError, Event};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::reader::{read_jsonl, report_malformed, JsonLine, ReadStats};

/// Record types that summarize a dump rather than stamp an event
pub const SUMMARY_RECORD_TYPES: [&str; 2] = ["StudyRecord", "SeriesRecord"];

/// Ordered events of one clock domain
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    pub clock: Clock,
    /// Events ordered by isotime (stable for equal times)
    pub events: Vec<Event>,
}

impl EventStream {
    /// Build a stream, ordering events by isotime
    pub fn new(clock: Clock, mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| e.isotime);
        Self { clock, events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Load one domain's event stream from a dump file.
///
/// # Errors
/// - `MissingFile` when the dump does not exist
/// - `Io` on read failure
#[instrument(
    name = "ingestion_load_events",
    skip_all,
    fields(clock = %clock, path = %path.display())
)]
pub fn load_events(
    path: &Path,
    clock: Clock,
    tz: Tz,
) -> Result<(EventStream, ReadStats), ContractError> {
    let (lines, mut stats) = read_jsonl(path)?;
    let source_name = path.display().to_string();
    let mut events = Vec::with_capacity(lines.len());
    let mut summaries = 0usize;

    for JsonLine { line, mut value } in lines {
        let record_type = value.get("type").and_then(|t| t.as_str());
        if record_type.is_some_and(|t| SUMMARY_RECORD_TYPES.contains(&t)) {
            summaries += 1;
            continue;
        }
        localize_isotime(&mut value, tz);
        match serde_json::from_value::<Event>(value) {
            Ok(event) => events.push(event),
            Err(e) => {
                let err = ContractError::malformed_record(&source_name, line, e.to_string());
                report_malformed(&err);
                stats.malformed += 1;
            }
        }
    }

    warn_duplicate_ids(clock, &events);
    stats.records = events.len();

    let stream = EventStream::new(clock, events);
    debug!(summaries, "skipped summary records");
    info!(events = stream.len(), malformed = stats.malformed, "loaded event stream");
    Ok((stream, stats))
}

/// Rewrite an offset-aware `isotime` as naive session-local time
fn localize_isotime(value: &mut Value, tz: Tz) {
    if let Some(Value::String(raw)) = value.get_mut("isotime") {
        if let Ok(local) = parse_isotime_in(raw, tz) {
            *raw = format_isotime(&local);
        }
    }
}

fn warn_duplicate_ids(clock: Clock, events: &[Event]) {
    let mut seen = HashSet::with_capacity(events.len());
    for event in events {
        if !seen.insert(event.id.as_str()) {
            warn!(clock = %clock, id = %event.id, "duplicate event id");
        }
    }
}
