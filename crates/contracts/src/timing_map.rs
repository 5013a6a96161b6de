//! TimingMapAnchor - Timing-Map Builder output
//!
//! One row of the timing map: per-clock offset and deviation measured at a
//! single reference instant. Persisted flat with `<clock>_id`,
//! `<clock>_isotime`, `<clock>_offset` and `<clock>_deviation` columns.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::isotime::{format_isotime, serde_isotime};
use crate::mark::{column_f64, column_isotime, column_str, has_column, opt_number};
use crate::{Clock, ContractError};

/// Per-clock values of one anchor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockOffset {
    /// Event id the value was measured on (absent when synthesized)
    pub id: Option<String>,
    /// Time in this clock at the anchor
    pub isotime: Option<NaiveDateTime>,
    /// `clock_isotime - reference_isotime` in seconds
    pub offset: Option<f64>,
    /// `clock_duration / reference_duration`, diagnostic only
    pub deviation: Option<f64>,
}

impl ClockOffset {
    /// Values of the reference clock itself
    pub fn reference(id: Option<String>, isotime: NaiveDateTime) -> Self {
        Self {
            id,
            isotime: Some(isotime),
            offset: Some(0.0),
            deviation: Some(1.0),
        }
    }
}

/// Timing map anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "AnchorRecord", try_from = "AnchorRecord")]
pub struct TimingMapAnchor {
    /// Reference time of the anchor
    pub isotime: NaiveDateTime,
    /// Reference-clock duration of the source mark (seconds)
    pub duration: Option<f64>,
    /// Session identifier
    pub session_id: Option<String>,
    /// Source mark id
    pub mark_id: Option<String>,
    /// Source mark name
    pub mark_name: Option<String>,
    /// Per-clock values, keyed by canonical clock
    pub clocks: BTreeMap<Clock, ClockOffset>,
}

impl TimingMapAnchor {
    /// Offset of a clock relative to the reference axis.
    ///
    /// `Isotime` is always `0.0`.
    pub fn offset(&self, clock: Clock) -> Option<f64> {
        if clock.is_isotime() {
            return Some(0.0);
        }
        self.clocks.get(&clock.canonical()).and_then(|c| c.offset)
    }

    /// Deviation ratio of a clock. `Isotime` is always `1.0`.
    pub fn deviation(&self, clock: Clock) -> Option<f64> {
        if clock.is_isotime() {
            return Some(1.0);
        }
        self.clocks.get(&clock.canonical()).and_then(|c| c.deviation)
    }

    /// Time in a clock at this anchor
    pub fn clock_isotime(&self, clock: Clock) -> Option<NaiveDateTime> {
        if clock.is_isotime() {
            return Some(self.isotime);
        }
        self.clocks.get(&clock.canonical()).and_then(|c| c.isotime)
    }
}

/// Flat line-delimited representation of a [`TimingMapAnchor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorRecord {
    #[serde(with = "serde_isotime")]
    pub isotime: NaiveDateTime,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mark_id: Option<String>,
    #[serde(default)]
    pub mark_name: Option<String>,
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

impl From<TimingMapAnchor> for AnchorRecord {
    fn from(anchor: TimingMapAnchor) -> Self {
        let mut columns = Map::new();
        for (clock, values) in &anchor.clocks {
            columns.insert(
                clock.field("id"),
                values.id.clone().map(Value::from).unwrap_or(Value::Null),
            );
            columns.insert(
                clock.field("isotime"),
                values
                    .isotime
                    .map(|t| Value::from(format_isotime(&t)))
                    .unwrap_or(Value::Null),
            );
            columns.insert(clock.field("offset"), opt_number(values.offset));
            columns.insert(clock.field("deviation"), opt_number(values.deviation));
        }
        Self {
            isotime: anchor.isotime,
            duration: anchor.duration,
            session_id: anchor.session_id,
            mark_id: anchor.mark_id,
            mark_name: anchor.mark_name,
            columns,
        }
    }
}

impl TryFrom<AnchorRecord> for TimingMapAnchor {
    type Error = ContractError;

    fn try_from(record: AnchorRecord) -> Result<Self, Self::Error> {
        let mut clocks = BTreeMap::new();
        for clock in Clock::COLUMNS {
            let seen = ["id", "isotime", "offset", "deviation"]
                .iter()
                .any(|suffix| has_column(&record.columns, clock, suffix));
            if !seen {
                continue;
            }
            clocks.insert(
                clock,
                ClockOffset {
                    id: column_str(&record.columns, clock, "id"),
                    isotime: column_isotime(&record.columns, clock, "isotime")?,
                    offset: column_f64(&record.columns, clock, "offset"),
                    deviation: column_f64(&record.columns, clock, "deviation"),
                },
            );
        }

        Ok(Self {
            isotime: record.isotime,
            duration: record.duration,
            session_id: record.session_id,
            mark_id: record.mark_id,
            mark_name: record.mark_name,
            clocks,
        })
    }
}
