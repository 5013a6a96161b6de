//! Series segmentation.
//!
//! Groups one domain's ordered events into maximal periodic runs. A gap
//! within `[nominal * low, nominal * high]` extends the current run; any
//! other gap closes it. Closed runs shorter than the configured minimum are
//! discarded.

use contracts::isotime::{format_isotime, seconds_between};
use contracts::{Clock, Event, SegmenterConfig, Series};
use tracing::{debug, info, instrument};

use crate::service::TimingMapService;

/// Segmentation outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// Runs kept as series
    pub series: usize,
    /// Runs shorter than the minimum length
    pub discarded: usize,
}

/// Periodic run detector for one configuration
#[derive(Debug)]
pub struct Segmenter<'a> {
    config: &'a SegmenterConfig,
    service: &'a TimingMapService,
}

impl<'a> Segmenter<'a> {
    pub fn new(config: &'a SegmenterConfig, service: &'a TimingMapService) -> Self {
        Self { config, service }
    }

    /// Segment a domain's events (ordered by isotime) into series.
    ///
    /// Fewer than two events yield an empty result.
    #[instrument(
        name = "segmenter_segment",
        skip_all,
        fields(clock = %clock, events = events.len())
    )]
    pub fn segment(&self, clock: Clock, events: &[Event]) -> (Vec<Series>, SegmentStats) {
        let mut stats = SegmentStats::default();
        let mut series = Vec::new();

        let Some((first, rest)) = events.split_first() else {
            return (series, stats);
        };
        if rest.is_empty() {
            debug!("fewer than two events, nothing to segment");
            return (series, stats);
        }

        let nominal = self.config.interval_for(clock);
        let low = nominal * self.config.tolerance_low;
        let high = nominal * self.config.tolerance_high;

        let mut run: Vec<&Event> = vec![first];
        for event in rest {
            let last = run[run.len() - 1];
            let gap = seconds_between(last.isotime, event.isotime);
            if low <= gap && gap <= high {
                run.push(event);
                continue;
            }
            self.close_run(clock, &run, &mut series, &mut stats);
            run = vec![event];
        }
        self.close_run(clock, &run, &mut series, &mut stats);

        link_next_intervals(&mut series);

        metrics::counter!("timing_series_detected_total", "clock" => clock.as_str())
            .increment(stats.series as u64);
        metrics::counter!("timing_series_discarded_total", "clock" => clock.as_str())
            .increment(stats.discarded as u64);
        info!(
            series = stats.series,
            discarded = stats.discarded,
            nominal_interval = nominal,
            "segmented event stream"
        );
        (series, stats)
    }

    fn close_run(
        &self,
        clock: Clock,
        run: &[&Event],
        series: &mut Vec<Series>,
        stats: &mut SegmentStats,
    ) {
        if run.len() < self.config.min_series_len {
            if let Some(first) = run.first() {
                debug!(
                    clock = %clock,
                    count = run.len(),
                    start = %format_isotime(&first.isotime),
                    min = self.config.min_series_len,
                    "discarding short run"
                );
            }
            stats.discarded += 1;
            return;
        }
        series.push(self.finalize(clock, run));
        stats.series += 1;
    }

    fn finalize(&self, clock: Clock, run: &[&Event]) -> Series {
        let start = run[0].isotime;
        let end = run[run.len() - 1].isotime;
        let gaps: f64 = run
            .windows(2)
            .map(|w| seconds_between(w[0].isotime, w[1].isotime))
            .sum();
        let count = run.len();

        let finalized = Series {
            clock,
            events: run.iter().map(|e| (*e).clone()).collect(),
            count,
            isotime_start: start,
            isotime_end: end,
            interval: gaps / (count - 1) as f64,
            duration: seconds_between(start, end),
            next_series_interval: 0.0,
            synced_isotime_start: self.service.convert(clock, Clock::Isotime, Some(start)),
            synced_isotime_end: self.service.convert(clock, Clock::Isotime, Some(end)),
        };
        debug!(
            clock = %clock,
            count,
            start = %format_isotime(&start),
            interval = finalized.interval,
            "series finalized"
        );
        finalized
    }
}

/// Set each series' start-to-start gap to its successor; the last keeps `0.0`
fn link_next_intervals(series: &mut [Series]) {
    for i in 1..series.len() {
        let gap = seconds_between(series[i - 1].isotime_start, series[i].isotime_start);
        series[i - 1].next_series_interval = gap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use contracts::isotime::{parse_isotime, shift};

    fn t0() -> NaiveDateTime {
        parse_isotime("2024-06-04T13:54:19.385115").unwrap()
    }

    fn run_at(prefix: &str, start: f64, count: usize, interval: f64) -> Vec<Event> {
        (0..count)
            .map(|i| {
                Event::new(
                    format!("{prefix}_{:06}", i + 1),
                    shift(t0(), start + i as f64 * interval),
                )
            })
            .collect()
    }

    fn segment(events: &[Event]) -> (Vec<Series>, SegmentStats) {
        let config = SegmenterConfig::default();
        let service = TimingMapService::empty();
        Segmenter::new(&config, &service).segment(Clock::Birch, events)
    }

    #[test]
    fn test_run_of_six_is_one_series() {
        let (series, stats) = segment(&run_at("birch", 0.0, 6, 2.0));
        assert_eq!(series.len(), 1);
        assert_eq!(stats.discarded, 0);
        let s = &series[0];
        assert_eq!(s.count, 6);
        assert_eq!(s.events.len(), 6);
        assert!((s.interval - 2.0).abs() < 1e-9);
        assert!((s.duration - 10.0).abs() < 1e-9);
        assert_eq!(s.next_series_interval, 0.0);
        assert_eq!(s.synced_isotime_start, Some(s.isotime_start));
    }

    #[test]
    fn test_run_of_five_is_discarded() {
        let (series, stats) = segment(&run_at("birch", 0.0, 5, 2.0));
        assert!(series.is_empty());
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn test_fewer_than_two_events() {
        assert!(segment(&[]).0.is_empty());
        assert!(segment(&run_at("birch", 0.0, 1, 2.0)).0.is_empty());
    }

    #[test]
    fn test_gap_splits_runs_and_links_next_interval() {
        let mut events = run_at("a", 0.0, 8, 2.0);
        events.extend(run_at("b", 30.0, 3, 2.0));
        events.extend(run_at("c", 60.0, 7, 2.1));

        let (series, stats) = segment(&events);
        assert_eq!(series.len(), 2);
        assert_eq!(stats.discarded, 1);
        assert_eq!(series[0].count, 8);
        assert_eq!(series[1].count, 7);
        assert!((series[0].next_series_interval - 60.0).abs() < 1e-6);
        assert_eq!(series[1].next_series_interval, 0.0);
        assert!((series[1].interval - 2.1).abs() < 1e-6);
    }

    #[test]
    fn test_tolerance_bounds() {
        // upper bound for a 2.0s nominal interval is 2.4s
        let mut events = run_at("a", 0.0, 6, 2.0);
        events.push(Event::new("a_late", shift(t0(), 10.0 + 2.39)));
        let (series, _) = segment(&events);
        assert_eq!(series[0].count, 7);

        let mut events = run_at("a", 0.0, 6, 2.0);
        events.push(Event::new("a_too_late", shift(t0(), 10.0 + 2.5)));
        let (series, stats) = segment(&events);
        assert_eq!(series[0].count, 6);
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn test_deterministic() {
        let mut events = run_at("a", 0.0, 10, 2.0);
        events.extend(run_at("b", 40.0, 6, 2.0));
        let (first, _) = segment(&events);
        let (second, _) = segment(&events);
        assert_eq!(first, second);
    }

    #[test]
    fn test_synced_times_use_service() {
        let config = SegmenterConfig::default();
        let mut offsets = std::collections::BTreeMap::new();
        offsets.insert(Clock::Dicoms, 372.0);
        let service = TimingMapService::empty().with_calibration(&offsets);
        let events = run_at("dicom", 372.0, 6, 2.0);
        let (series, _) = Segmenter::new(&config, &service).segment(Clock::Dicoms, &events);
        assert_eq!(series[0].synced_isotime_start, Some(t0()));
    }
}
