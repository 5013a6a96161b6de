//! Pipeline statistics.

use std::time::Duration;

use observability::RunSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Wall time per completed stage, in execution order
    pub stages: Vec<(&'static str, Duration)>,

    /// Per-stage counters
    pub summary: RunSummary,
}

impl PipelineStats {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            stages: Vec::new(),
            summary: RunSummary::new(session_id),
        }
    }

    /// Total wall time of all stages
    pub fn duration(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }

    /// Print the summary on stderr; stdout carries records only
    pub fn print_summary(&self) {
        eprintln!();
        eprint!("{}", self.summary);
        for (stage, elapsed) in &self.stages {
            eprintln!("  {stage}: {:.3}s", elapsed.as_secs_f64());
        }
        eprintln!("Total: {:.3}s", self.duration().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_sums_stages() {
        let mut stats = PipelineStats::new(None);
        stats.stages.push(("ingest", Duration::from_millis(250)));
        stats.stages.push(("marks", Duration::from_millis(750)));
        assert_eq!(stats.duration(), Duration::from_secs(1));
    }
}
