//! Event - Event Normalizer output
//!
//! One normalized, immutable fact from a single clock domain.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::isotime::{format_isotime, serde_isotime};

/// Normalized event
///
/// Fields other than `id`, `isotime` and `duration` are carried through
/// untouched as the opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique event id
    pub id: String,

    /// Local-clock timestamp
    #[serde(with = "serde_isotime")]
    pub isotime: NaiveDateTime,

    /// Event duration in seconds, when the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Source-specific fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Create an event with an empty payload
    pub fn new(id: impl Into<String>, isotime: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            isotime,
            duration: None,
            payload: Map::new(),
        }
    }

    /// Short label for diagnostics
    pub fn label(&self) -> String {
        format!("{}@{}", self.id, format_isotime(&self.isotime))
    }
}
