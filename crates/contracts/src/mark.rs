//! Mark - Mark Generator output
//!
//! A cross-domain anchor tying together event ids believed to represent the
//! same real-world instant. Persisted as one flat `MarkRecord` per line with
//! `<clock>_id`, `<clock>_isotime` and `<clock>_duration` columns.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::isotime::{format_isotime, parse_isotime};
use crate::{Clock, ContractError};

const MARK_RECORD_TYPE: &str = "MarkRecord";

/// Mark kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    /// First event of a reference series
    Start,
    /// One event of a reference series
    Scan,
    /// Last event of a reference series
    End,
}

impl MarkKind {
    /// Every kind, in emission order
    pub const ALL: [MarkKind; 3] = [MarkKind::Start, MarkKind::Scan, MarkKind::End];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkKind::Start => "start",
            MarkKind::Scan => "scan",
            MarkKind::End => "end",
        }
    }
}

impl fmt::Display for MarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-clock values carried by a mark
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockSample {
    /// Tied event id
    pub id: Option<String>,
    /// Event time in this clock
    pub isotime: Option<NaiveDateTime>,
    /// Duration in this clock (seconds)
    pub duration: Option<f64>,
}

impl ClockSample {
    /// Sample tied to an event
    pub fn new(id: impl Into<String>, isotime: NaiveDateTime, duration: Option<f64>) -> Self {
        Self {
            id: Some(id.into()),
            isotime: Some(isotime),
            duration,
        }
    }

    /// A clock counts as present on a mark when its isotime is known
    pub fn is_present(&self) -> bool {
        self.isotime.is_some()
    }
}

/// Synchronization mark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MarkRecord", try_from = "MarkRecord")]
pub struct Mark {
    /// Unique mark id, e.g. `mark_000042`
    pub id: String,
    /// Session identifier, e.g. `ses-20240604`
    pub session_id: Option<String>,
    /// Mark kind
    pub kind: MarkKind,
    /// Human-readable name
    pub name: String,
    /// Every event id tied to this instant, across all clocks
    pub target_ids: Vec<String>,
    /// Per-clock values, keyed by canonical clock
    pub clocks: BTreeMap<Clock, ClockSample>,
}

impl Mark {
    /// Sample for a clock, resolving aliases
    pub fn sample(&self, clock: Clock) -> Option<&ClockSample> {
        self.clocks.get(&clock.canonical())
    }

    /// Event time in the given clock, if present
    pub fn isotime(&self, clock: Clock) -> Option<NaiveDateTime> {
        self.sample(clock).and_then(|s| s.isotime)
    }

    /// Duration in the given clock, if present
    pub fn duration(&self, clock: Clock) -> Option<f64> {
        self.sample(clock).and_then(|s| s.duration)
    }

    /// Whether the clock has a known isotime on this mark
    pub fn has_clock(&self, clock: Clock) -> bool {
        self.sample(clock).is_some_and(ClockSample::is_present)
    }

    /// Clocks present on this mark
    pub fn present_clocks(&self) -> impl Iterator<Item = Clock> + '_ {
        self.clocks
            .iter()
            .filter(|(_, sample)| sample.is_present())
            .map(|(clock, _)| *clock)
    }

    /// Set the sample for a clock and record its event id in `target_ids`
    pub fn tie(&mut self, clock: Clock, sample: ClockSample) {
        if let Some(id) = &sample.id {
            if !self.target_ids.contains(id) {
                self.target_ids.push(id.clone());
            }
        }
        self.clocks.insert(clock.canonical(), sample);
    }
}

/// Flat line-delimited representation of a [`Mark`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkRecord {
    #[serde(rename = "type", default = "mark_record_type")]
    pub record_type: String,
    pub id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub kind: MarkKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target_ids: Vec<String>,
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

fn mark_record_type() -> String {
    MARK_RECORD_TYPE.to_string()
}

impl From<Mark> for MarkRecord {
    fn from(mark: Mark) -> Self {
        let mut columns = Map::new();
        for (clock, sample) in &mark.clocks {
            columns.insert(
                clock.field("id"),
                sample.id.clone().map(Value::from).unwrap_or(Value::Null),
            );
            columns.insert(
                clock.field("isotime"),
                sample
                    .isotime
                    .map(|t| Value::from(format_isotime(&t)))
                    .unwrap_or(Value::Null),
            );
            columns.insert(clock.field("duration"), opt_number(sample.duration));
        }
        Self {
            record_type: mark_record_type(),
            id: mark.id,
            session_id: mark.session_id,
            kind: mark.kind,
            name: mark.name,
            target_ids: mark.target_ids,
            columns,
        }
    }
}

impl TryFrom<MarkRecord> for Mark {
    type Error = ContractError;

    fn try_from(record: MarkRecord) -> Result<Self, Self::Error> {
        if record.record_type != MARK_RECORD_TYPE {
            return Err(ContractError::Other(format!(
                "unexpected record type '{}', expected {MARK_RECORD_TYPE}",
                record.record_type
            )));
        }

        let mut clocks = BTreeMap::new();
        for clock in Clock::COLUMNS {
            let id = column_str(&record.columns, clock, "id");
            let isotime = column_isotime(&record.columns, clock, "isotime")?;
            let duration = column_f64(&record.columns, clock, "duration");
            let seen = has_column(&record.columns, clock, "id")
                || has_column(&record.columns, clock, "isotime")
                || has_column(&record.columns, clock, "duration");
            if seen {
                clocks.insert(
                    clock,
                    ClockSample {
                        id,
                        isotime,
                        duration,
                    },
                );
            }
        }

        Ok(Self {
            id: record.id,
            session_id: record.session_id,
            kind: record.kind,
            name: record.name,
            target_ids: record.target_ids,
            clocks,
        })
    }
}

pub(crate) fn opt_number(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Keys a column may be stored under: the canonical name, then aliases.
fn column_keys(clock: Clock, suffix: &str) -> Vec<String> {
    let mut keys = vec![clock.field(suffix)];
    if clock == Clock::Qrinfo {
        keys.push(format!("{}_{}", Clock::ReprostimVideo.as_str(), suffix));
    }
    keys
}

pub(crate) fn column<'a>(
    columns: &'a Map<String, Value>,
    clock: Clock,
    suffix: &str,
) -> Option<&'a Value> {
    column_keys(clock, suffix)
        .iter()
        .filter_map(|key| columns.get(key))
        .find(|value| !value.is_null())
}

pub(crate) fn has_column(columns: &Map<String, Value>, clock: Clock, suffix: &str) -> bool {
    column_keys(clock, suffix)
        .iter()
        .any(|key| columns.contains_key(key))
}

pub(crate) fn column_str(
    columns: &Map<String, Value>,
    clock: Clock,
    suffix: &str,
) -> Option<String> {
    column(columns, clock, suffix)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn column_f64(columns: &Map<String, Value>, clock: Clock, suffix: &str) -> Option<f64> {
    column(columns, clock, suffix).and_then(Value::as_f64)
}

pub(crate) fn column_isotime(
    columns: &Map<String, Value>,
    clock: Clock,
    suffix: &str,
) -> Result<Option<NaiveDateTime>, ContractError> {
    match column(columns, clock, suffix).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => parse_isotime(s).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveDateTime {
        parse_isotime(s).unwrap()
    }

    fn sample_mark() -> Mark {
        let mut mark = Mark {
            id: "mark_000001".into(),
            session_id: Some("ses-20240604".into()),
            kind: MarkKind::Start,
            name: "series 1 start".into(),
            target_ids: Vec::new(),
            clocks: BTreeMap::new(),
        };
        mark.tie(
            Clock::Birch,
            ClockSample::new("birch_000001", t("2024-06-04T13:54:19.385115"), Some(18.0)),
        );
        mark.tie(
            Clock::Dicoms,
            ClockSample::new("dicom_000001", t("2024-06-04T14:00:31.507500"), Some(18.005)),
        );
        mark.clocks.insert(Clock::Psychopy, ClockSample::default());
        mark
    }

    #[test]
    fn test_tie_accumulates_target_ids() {
        let mark = sample_mark();
        assert_eq!(mark.target_ids, vec!["birch_000001", "dicom_000001"]);
        assert!(mark.has_clock(Clock::Birch));
        assert!(!mark.has_clock(Clock::Psychopy));
        assert!(!mark.has_clock(Clock::Qrinfo));
        assert_eq!(
            mark.present_clocks().collect::<Vec<_>>(),
            vec![Clock::Birch, Clock::Dicoms]
        );
    }

    #[test]
    fn test_record_layout() {
        let value = serde_json::to_value(sample_mark()).unwrap();
        assert_eq!(value["type"], "MarkRecord");
        assert_eq!(value["kind"], "start");
        assert_eq!(value["birch_isotime"], "2024-06-04T13:54:19.385115");
        assert_eq!(value["dicoms_duration"], 18.005);
        assert!(value["psychopy_isotime"].is_null());
        assert!(value.get("qrinfo_isotime").is_none());
    }

    #[test]
    fn test_record_read_back() {
        let line = serde_json::to_string(&sample_mark()).unwrap();
        let mark: Mark = serde_json::from_str(&line).unwrap();
        assert_eq!(mark, sample_mark());
    }

    #[test]
    fn test_reprostim_video_alias_is_read_as_qrinfo() {
        let line = r#"{"type":"MarkRecord","id":"mark_000002","kind":"scan","name":"x",
            "reprostim_video_isotime":"2024-06-04T13:54:19.703000",
            "reprostim_video_duration":2.0}"#;
        let mark: Mark = serde_json::from_str(line).unwrap();
        assert_eq!(
            mark.isotime(Clock::ReprostimVideo),
            Some(t("2024-06-04T13:54:19.703"))
        );
        assert_eq!(mark.duration(Clock::Qrinfo), Some(2.0));
    }

    #[test]
    fn test_wrong_record_type_rejected() {
        let line = r#"{"type":"DicomRecord","id":"x","kind":"start"}"#;
        assert!(serde_json::from_str::<Mark>(line).is_err());
    }
}
