//! Series matching.
//!
//! Finds the series in another clock domain that most plausibly records the
//! same real-world burst as a reference series.
//!
//! Candidates are scanned in order and the scan stops at the first failing
//! candidate once a match exists. This assumes candidates are time-ordered
//! and true matches are local.

use std::fmt;

use contracts::isotime::seconds_between;
use contracts::{contains, Clock, MatcherConfig, Series, TimingConfig};
use tracing::{debug, instrument};

use crate::service::TimingMapService;

/// Rule that excluded a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Event counts differ
    Count,
    /// Mean interval outside tolerance
    Interval,
    /// Gap to the following series outside tolerance
    NextInterval,
    /// Only one side is the last series of its domain
    LastSeries,
    /// Start times too far apart on the reference axis
    StartTime,
    /// Start time not convertible to the reference axis
    Unconvertible,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Count => "count",
            Rejection::Interval => "interval",
            Rejection::NextInterval => "next_interval",
            Rejection::LastSeries => "last_series",
            Rejection::StartTime => "start_time",
            Rejection::Unconvertible => "unconvertible",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted candidate
#[derive(Debug, Clone, Copy)]
pub struct SeriesMatch<'s> {
    /// Position in the candidate list
    pub index: usize,
    pub series: &'s Series,
    /// Absolute start-time difference in seconds (lower is better)
    pub score: f64,
}

/// Heuristic series matcher
#[derive(Debug)]
pub struct Matcher<'a> {
    config: &'a TimingConfig,
    service: &'a TimingMapService,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a TimingConfig, service: &'a TimingMapService) -> Self {
        Self { config, service }
    }

    fn rules(&self) -> &MatcherConfig {
        &self.config.matcher
    }

    /// Best matching candidate for `reference`, if any.
    #[instrument(
        level = "debug",
        name = "matcher_best_match",
        skip_all,
        fields(reference = %reference.clock, candidates = candidates.len())
    )]
    pub fn best_match<'s>(
        &self,
        reference: &Series,
        candidates: &'s [Series],
    ) -> Option<SeriesMatch<'s>> {
        let mut best: Option<SeriesMatch<'s>> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            match self.score(reference, candidate) {
                Ok(score) => {
                    let better = best.as_ref().map_or(true, |b| score < b.score);
                    if better {
                        best = Some(SeriesMatch {
                            index,
                            series: candidate,
                            score,
                        });
                    }
                }
                Err(rule) => {
                    debug!(
                        reference = %reference.clock,
                        candidate = %candidate.clock,
                        index,
                        rule = %rule,
                        "candidate rejected (tolerance mismatch)"
                    );
                    metrics::counter!("timing_candidates_rejected_total", "rule" => rule.as_str())
                        .increment(1);
                    if best.is_some() {
                        break;
                    }
                }
            }
        }

        if let Some(found) = &best {
            debug!(index = found.index, score = found.score, "series matched");
        }
        best
    }

    /// Score a single candidate, or the first rule it violates.
    pub fn score(&self, reference: &Series, candidate: &Series) -> Result<f64, Rejection> {
        let rules = self.rules();
        let (a, b) = (reference.clock, candidate.clock);

        if reference.count != candidate.count {
            return Err(Rejection::Count);
        }

        let tolerance = if contains(&rules.noisy_clocks, a) || contains(&rules.noisy_clocks, b) {
            rules.noisy_interval_tolerance
        } else {
            rules.interval_tolerance
        };

        if reference.interval != 0.0
            && candidate.interval != 0.0
            && !within(reference.interval, candidate.interval, tolerance)
        {
            return Err(Rejection::Interval);
        }

        let ref_next = reference.next_series_interval;
        let cand_next = candidate.next_series_interval;
        match (ref_next == 0.0, cand_next == 0.0) {
            (false, false) => {
                if !within(ref_next, cand_next, tolerance) {
                    return Err(Rejection::NextInterval);
                }
            }
            (true, false) | (false, true) => {
                let exempt = contains(&rules.last_series_exempt, a)
                    || contains(&rules.last_series_exempt, b);
                if !exempt {
                    return Err(Rejection::LastSeries);
                }
            }
            (true, true) => {}
        }

        let ref_start = self
            .service
            .convert(a, Clock::Isotime, Some(reference.isotime_start))
            .ok_or(Rejection::Unconvertible)?;
        let cand_start = self
            .service
            .convert(b, Clock::Isotime, Some(candidate.isotime_start))
            .ok_or(Rejection::Unconvertible)?;
        let diff = seconds_between(ref_start, cand_start).abs();

        if diff > self.start_threshold(a, b) {
            return Err(Rejection::StartTime);
        }
        Ok(diff)
    }

    /// Start threshold for a clock pair; coarse clocks get the wide window
    /// unless they are manually calibrated.
    fn start_threshold(&self, a: Clock, b: Clock) -> f64 {
        let rules = self.rules();
        let uncalibrated_coarse = [a, b].into_iter().any(|clock| {
            contains(&rules.coarse_clocks, clock)
                && self.config.manual_offset(clock).is_none()
                && self.service.calibration(clock).is_none()
        });
        if uncalibrated_coarse {
            rules.coarse_start_threshold_s
        } else {
            rules.start_threshold_s
        }
    }
}

fn within(reference: f64, candidate: f64, tolerance: f64) -> bool {
    (candidate - reference).abs() <= tolerance * reference.abs()
}
