//! Mark generation.
//!
//! Walks the reference clock's series in time order and ties each one to its
//! matched series in every other configured domain, emitting a start mark, one
//! scan mark per event and an end mark.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use contracts::isotime::{format_isotime, seconds_between};
use contracts::{
    Clock, ClockSample, ContractError, Event, IdSequence, Mark, MarkKind, Series, TimingConfig,
};
use tracing::{debug, info, instrument};

use crate::matcher::Matcher;
use crate::service::TimingMapService;

/// Id prefix of generated marks
pub const MARK_ID_PREFIX: &str = "mark";

/// Mark generation counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkStats {
    /// Reference series processed
    pub reference_series: usize,
    /// Marks emitted per kind
    pub by_kind: BTreeMap<MarkKind, usize>,
    /// Reference series matched per domain
    pub matched: BTreeMap<Clock, usize>,
    /// Clock samples filled by loose matching
    pub loose_filled: usize,
}

impl MarkStats {
    pub fn total(&self) -> usize {
        self.by_kind.values().sum()
    }
}

/// Per-domain inputs of one session
#[derive(Debug, Clone, Default)]
pub struct DomainInputs {
    /// Series per canonical clock, ordered by start
    pub series: BTreeMap<Clock, Vec<Series>>,
    /// Raw events per canonical clock, ordered by isotime (loose matching)
    pub events: BTreeMap<Clock, Vec<Event>>,
}

impl DomainInputs {
    pub fn series(&self, clock: Clock) -> &[Series] {
        self.series
            .get(&clock.canonical())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn events(&self, clock: Clock) -> &[Event] {
        self.events
            .get(&clock.canonical())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Cross-domain mark generator
#[derive(Debug)]
pub struct MarkGenerator<'a> {
    config: &'a TimingConfig,
    service: &'a TimingMapService,
    session_id: Option<String>,
}

impl<'a> MarkGenerator<'a> {
    pub fn new(config: &'a TimingConfig, service: &'a TimingMapService) -> Self {
        Self {
            config,
            service,
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Generate marks for every reference series.
    ///
    /// # Errors
    /// `MissingData` when the reference clock has no series.
    #[instrument(
        name = "marks_generate",
        skip_all,
        fields(reference = %self.config.reference_clock)
    )]
    pub fn generate(
        &self,
        inputs: &DomainInputs,
        ids: &mut IdSequence,
    ) -> Result<(Vec<Mark>, MarkStats), ContractError> {
        let reference = self.config.reference_clock;
        let ref_series = inputs.series(reference);
        if ref_series.is_empty() {
            return Err(ContractError::missing_data(
                format!("{reference} series"),
                "no series detected in the reference clock",
            ));
        }

        let matcher = Matcher::new(self.config, self.service);
        let mut stats = MarkStats::default();
        let mut marks = Vec::new();

        for (idx, series) in ref_series.iter().enumerate() {
            let number = idx + 1;
            let matched = self.match_domains(&matcher, series, inputs, &mut stats);

            let mut series_marks = Vec::with_capacity(series.count + 2);
            series_marks.push(self.start_mark(number, series, &matched, ids));
            for i in 0..series.count {
                series_marks.push(self.scan_mark(number, i, series, &matched, ids));
            }
            series_marks.push(self.end_mark(number, series, &matched, ids));

            if self.config.marks.loose_matching {
                for mark in &mut series_marks {
                    stats.loose_filled += self.loose_fill(mark, inputs);
                }
            }

            for mark in &series_marks {
                *stats.by_kind.entry(mark.kind).or_default() += 1;
            }
            marks.extend(series_marks);
            stats.reference_series += 1;
        }

        for (kind, count) in &stats.by_kind {
            metrics::counter!("timing_marks_emitted_total", "kind" => kind.as_str())
                .increment(*count as u64);
        }
        info!(
            reference_series = stats.reference_series,
            marks = stats.total(),
            loose_filled = stats.loose_filled,
            "generated marks"
        );
        Ok((marks, stats))
    }

    /// Match every other domain against the reference series, in priority
    /// order, chaining on the previously matched series.
    fn match_domains<'s>(
        &self,
        matcher: &Matcher<'_>,
        reference: &Series,
        inputs: &'s DomainInputs,
        stats: &mut MarkStats,
    ) -> Vec<(Clock, &'s Series)> {
        let mut matched: Vec<(Clock, &'s Series)> = Vec::new();

        for domain in self.config.domains() {
            let candidates = inputs.series(domain);
            if candidates.is_empty() {
                debug!(domain = %domain, "no series in domain");
                continue;
            }

            let chained = if self.config.marks.chain_matches {
                matched
                    .last()
                    .and_then(|(_, prev)| matcher.best_match(prev, candidates))
            } else {
                None
            };
            let found = chained.or_else(|| matcher.best_match(reference, candidates));

            match found {
                Some(m) => {
                    let raw_offset =
                        seconds_between(m.series.isotime_start, reference.isotime_start);
                    info!(
                        domain = %domain,
                        reference_start = %format_isotime(&reference.isotime_start),
                        domain_start = %format_isotime(&m.series.isotime_start),
                        raw_offset,
                        score = m.score,
                        "matched series"
                    );
                    *stats.matched.entry(domain.canonical()).or_default() += 1;
                    matched.push((domain, m.series));
                }
                None => {
                    debug!(
                        domain = %domain,
                        reference_start = %format_isotime(&reference.isotime_start),
                        "no matching series"
                    );
                }
            }
        }
        matched
    }

    fn new_mark(&self, kind: MarkKind, name: String, ids: &mut IdSequence) -> Mark {
        let clocks = self
            .config
            .clocks
            .iter()
            .map(|clock| (clock.canonical(), ClockSample::default()))
            .collect();
        Mark {
            id: ids.next_id(MARK_ID_PREFIX),
            session_id: self.session_id.clone(),
            kind,
            name,
            target_ids: Vec::new(),
            clocks,
        }
    }

    fn start_mark(
        &self,
        number: usize,
        reference: &Series,
        matched: &[(Clock, &Series)],
        ids: &mut IdSequence,
    ) -> Mark {
        let mut mark = self.new_mark(MarkKind::Start, format!("series {number} start"), ids);
        for (clock, series) in with_reference(reference, matched) {
            if let Some(first) = series.first() {
                mark.tie(
                    clock,
                    ClockSample::new(first.id.clone(), series.isotime_start, Some(series.duration)),
                );
            }
        }
        mark
    }

    fn scan_mark(
        &self,
        number: usize,
        index: usize,
        reference: &Series,
        matched: &[(Clock, &Series)],
        ids: &mut IdSequence,
    ) -> Mark {
        let mut mark = self.new_mark(MarkKind::Scan, format!("series {number} scan {index}"), ids);
        for (clock, series) in with_reference(reference, matched) {
            let Some(event) = series.events.get(index) else {
                continue;
            };
            let duration = series
                .events
                .get(index + 1)
                .map(|next| seconds_between(event.isotime, next.isotime));
            mark.tie(clock, ClockSample::new(event.id.clone(), event.isotime, duration));
        }
        mark
    }

    fn end_mark(
        &self,
        number: usize,
        reference: &Series,
        matched: &[(Clock, &Series)],
        ids: &mut IdSequence,
    ) -> Mark {
        let mut mark = self.new_mark(MarkKind::End, format!("series {number} end"), ids);
        for (clock, series) in with_reference(reference, matched) {
            if let Some(last) = series.last() {
                mark.tie(clock, ClockSample::new(last.id.clone(), series.isotime_end, None));
            }
        }
        mark
    }

    /// Fill configured domains missing on a mark with the nearest raw event
    /// inside the loose window around the converted reference time.
    fn loose_fill(&self, mark: &mut Mark, inputs: &DomainInputs) -> usize {
        let reference = self.config.reference_clock;
        let Some(ref_time) = mark.isotime(reference) else {
            return 0;
        };

        let mut filled = 0;
        for domain in self.config.domains() {
            if mark.has_clock(domain) {
                continue;
            }
            let Some(target) = self.service.convert(reference, domain, Some(ref_time)) else {
                continue;
            };
            let window = self.config.marks.loose_window_s;
            if let Some(event) = nearest_within(inputs.events(domain), target, window) {
                debug!(
                    mark = %mark.id,
                    domain = %domain,
                    event = %event.label(),
                    "loose match"
                );
                mark.tie(
                    domain,
                    ClockSample::new(event.id.clone(), event.isotime, event.duration),
                );
                filled += 1;
            }
        }
        filled
    }
}

/// Nearest event to `target` within `±window` seconds (events ordered by isotime)
pub fn nearest_within(events: &[Event], target: NaiveDateTime, window: f64) -> Option<&Event> {
    let split = events.partition_point(|e| e.isotime < target);
    let before = split.checked_sub(1).and_then(|i| events.get(i));
    let after = events.get(split);

    [before, after]
        .into_iter()
        .flatten()
        .map(|e| (e, seconds_between(target, e.isotime).abs()))
        .filter(|(_, gap)| *gap <= window)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

/// Reference series followed by the matched domain series
fn with_reference<'a>(
    reference: &'a Series,
    matched: &'a [(Clock, &'a Series)],
) -> impl Iterator<Item = (Clock, &'a Series)> + 'a {
    std::iter::once((reference.clock, reference)).chain(matched.iter().copied())
}
