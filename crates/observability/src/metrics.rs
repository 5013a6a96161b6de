//! Run metrics.
//!
//! Stage timings go to the global `metrics` recorder; `RunSummary` keeps an
//! in-memory copy of the per-stage counters for the end-of-run report.

use std::collections::BTreeMap;
use std::fmt;

use contracts::{Clock, MarkKind, TimingMapAnchor};
use metrics::{gauge, histogram};

/// Record the wall time of a pipeline stage
pub fn record_stage_duration(stage: &'static str, seconds: f64) {
    histogram!("timing_stage_duration_seconds", "stage" => stage).record(seconds);
}

/// Per-clock ingestion and segmentation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockCounts {
    pub events: u64,
    pub malformed: u64,
    pub out_of_range: u64,
    pub series: u64,
    pub discarded: u64,
    /// Reference series matched in this clock
    pub matched: u64,
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub session_id: Option<String>,
    pub clocks: BTreeMap<Clock, ClockCounts>,
    pub reference_series: u64,
    pub marks: BTreeMap<MarkKind, u64>,
    pub anchors: u64,
    /// Anchor offsets per clock (seconds)
    pub offsets: BTreeMap<Clock, RunningStats>,
    /// Anchor deviation ratios per clock
    pub deviations: BTreeMap<Clock, RunningStats>,
    pub records_written: u64,
}

impl RunSummary {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            ..Self::default()
        }
    }

    fn clock(&mut self, clock: Clock) -> &mut ClockCounts {
        self.clocks.entry(clock.canonical()).or_default()
    }

    pub fn record_events(
        &mut self,
        clock: Clock,
        events: usize,
        malformed: usize,
        out_of_range: usize,
    ) {
        let counts = self.clock(clock);
        counts.events += events as u64;
        counts.malformed += malformed as u64;
        counts.out_of_range += out_of_range as u64;
    }

    pub fn record_series(&mut self, clock: Clock, series: usize, discarded: usize) {
        let counts = self.clock(clock);
        counts.series += series as u64;
        counts.discarded += discarded as u64;
    }

    pub fn record_matched(&mut self, clock: Clock, matched: usize) {
        self.clock(clock).matched += matched as u64;
    }

    pub fn record_marks(&mut self, kind: MarkKind, count: usize) {
        *self.marks.entry(kind).or_default() += count as u64;
    }

    /// Aggregate offsets and deviations of every non-reference clock column
    pub fn record_anchors(&mut self, anchors: &[TimingMapAnchor], reference: Clock) {
        self.anchors += anchors.len() as u64;
        for anchor in anchors {
            for clock in anchor.clocks.keys().copied() {
                if clock.canonical() == reference.canonical() {
                    continue;
                }
                if let Some(offset) = anchor.offset(clock) {
                    self.offsets.entry(clock).or_default().push(offset);
                }
                if let Some(deviation) = anchor.deviation(clock) {
                    self.deviations.entry(clock).or_default().push(deviation);
                }
            }
        }
        for (clock, stats) in &self.offsets {
            gauge!("timing_anchor_offset_mean_seconds", "clock" => clock.as_str())
                .set(stats.mean());
        }
    }

    pub fn record_written(&mut self, records: u64) {
        self.records_written += records;
    }

    pub fn total_marks(&self) -> u64 {
        self.marks.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Timing Run Summary ===")?;
        if let Some(session) = &self.session_id {
            writeln!(f, "Session: {session}")?;
        }
        for (clock, c) in &self.clocks {
            writeln!(
                f,
                "{clock}: events={} malformed={} out_of_range={} series={} discarded={} matched={}",
                c.events, c.malformed, c.out_of_range, c.series, c.discarded, c.matched
            )?;
        }
        if self.reference_series > 0 {
            writeln!(f, "Reference series: {}", self.reference_series)?;
        }
        if !self.marks.is_empty() {
            let kinds = self
                .marks
                .iter()
                .map(|(kind, n)| format!("{kind}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "Marks: {} ({kinds})", self.total_marks())?;
        }
        if self.anchors > 0 {
            writeln!(f, "Anchors: {}", self.anchors)?;
            for (clock, stats) in &self.offsets {
                writeln!(f, "  {clock} offset (s): {}", StatsSummary::from(stats))?;
            }
            for (clock, stats) in &self.deviations {
                writeln!(f, "  {clock} deviation: {}", StatsSummary::from(stats))?;
            }
        }
        writeln!(f, "Records written: {}", self.records_written)
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.6}, max={:.6}, mean={:.6}, std={:.6} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
