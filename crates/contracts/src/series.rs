//! Series - Segmenter output
//!
//! A maximal run of periodic events within one clock domain. Transient, never
//! persisted.

use chrono::NaiveDateTime;

use crate::{Clock, Event};

/// Periodic run of events from one clock domain
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Clock domain the events were stamped in
    pub clock: Clock,

    /// Member events, ordered by isotime
    pub events: Vec<Event>,

    /// Number of events (`events.len()`)
    pub count: usize,

    /// First event time (local clock)
    pub isotime_start: NaiveDateTime,

    /// Last event time (local clock)
    pub isotime_end: NaiveDateTime,

    /// Mean gap between consecutive events (seconds)
    pub interval: f64,

    /// `isotime_end - isotime_start` (seconds)
    pub duration: f64,

    /// Start-to-start gap to the following series, `0.0` for the last one
    pub next_series_interval: f64,

    /// `isotime_start` converted to the reference time axis
    pub synced_isotime_start: Option<NaiveDateTime>,

    /// `isotime_end` converted to the reference time axis
    pub synced_isotime_end: Option<NaiveDateTime>,
}

impl Series {
    /// First member event
    pub fn first(&self) -> Option<&Event> {
        self.events.first()
    }

    /// Last member event
    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Whether this is the last series observed in its domain
    pub fn is_last(&self) -> bool {
        self.next_series_interval == 0.0
    }
}
