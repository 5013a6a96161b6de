//! Sink metrics for observability

/// Counters for a single sink
#[derive(Debug, Default, Clone)]
pub struct SinkMetrics {
    /// Total successful writes
    write_count: u64,
    /// Total write failures
    failure_count: u64,
    /// Records not offered because the sink had already failed
    skipped_count: u64,
    /// Message of the first failure
    first_failure: Option<String>,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped_count
    }

    pub fn first_failure(&self) -> Option<&str> {
        self.first_failure.as_deref()
    }

    pub(crate) fn record_write(&mut self, sink: &str) {
        self.write_count += 1;
        metrics::counter!("timing_records_written_total", "sink" => sink.to_string()).increment(1);
    }

    pub(crate) fn record_failure(&mut self, sink: &str, message: String) {
        self.failure_count += 1;
        self.first_failure.get_or_insert(message);
        metrics::counter!("timing_sink_failures_total", "sink" => sink.to_string()).increment(1);
    }

    pub(crate) fn record_skip(&mut self) {
        self.skipped_count += 1;
    }

    /// Whether any write has failed
    pub fn has_failed(&self) -> bool {
        self.failure_count > 0
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            write_count: self.write_count,
            failure_count: self.failure_count,
            skipped_count: self.skipped_count,
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub write_count: u64,
    pub failure_count: u64,
    pub skipped_count: u64,
}
