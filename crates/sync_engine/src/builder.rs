//! Timing-map building.
//!
//! Selects usable marks as anchors and converts each into per-clock offsets
//! relative to the reference clock.

use contracts::isotime::{format_isotime, seconds_between};
use contracts::{
    AnchorSelection, Clock, ClockOffset, ContractError, Mark, TimingConfig, TimingMapAnchor,
};
use tracing::{debug, info, instrument, warn};

use crate::service::{is_ascending, TimingMapService};

/// Anchor building counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Marks inspected
    pub considered: usize,
    /// Marks turned into anchors
    pub anchors: usize,
    /// Marks whose kind is not an anchor kind
    pub skipped_kind: usize,
    /// Marks lacking required clocks
    pub skipped_incomplete: usize,
    /// Skip-set clock values synthesized from earlier anchors
    pub synthesized: usize,
    /// Skip-set clock values left empty
    pub unresolved: usize,
}

/// `domain_duration / reference_duration`, if both are known and the
/// reference is non-zero
pub fn deviation(domain: Option<f64>, reference: Option<f64>) -> Option<f64> {
    match (domain, reference) {
        (Some(d), Some(r)) if r != 0.0 => Some(d / r),
        _ => None,
    }
}

/// Marks to timing map converter
#[derive(Debug)]
pub struct TimingMapBuilder<'a> {
    config: &'a TimingConfig,
}

impl<'a> TimingMapBuilder<'a> {
    pub fn new(config: &'a TimingConfig) -> Self {
        Self { config }
    }

    /// Build the timing map, ascending by reference isotime.
    ///
    /// # Errors
    /// `MissingData` when there are no marks or none qualifies as an anchor.
    #[instrument(
        name = "builder_build",
        skip_all,
        fields(marks = marks.len(), selection = ?self.config.timing_map.selection)
    )]
    pub fn build(
        &self,
        marks: &[Mark],
    ) -> Result<(Vec<TimingMapAnchor>, BuildStats), ContractError> {
        if marks.is_empty() {
            return Err(ContractError::missing_data("marks", "no marks to build a timing map from"));
        }

        let reference = self.config.reference_clock;
        let mut stats = BuildStats::default();
        let mut anchors: Vec<TimingMapAnchor> = Vec::new();

        for mark in marks {
            stats.considered += 1;
            if !self.config.timing_map.anchor_kinds.contains(&mark.kind) {
                stats.skipped_kind += 1;
                continue;
            }
            if !self.is_selected(mark) {
                debug!(mark = %mark.id, name = %mark.name, "mark lacks required clocks");
                stats.skipped_incomplete += 1;
                continue;
            }
            let Some(ref_isotime) = mark.isotime(reference) else {
                stats.skipped_incomplete += 1;
                continue;
            };

            let anchor = self.anchor_from(mark, ref_isotime, &anchors, &mut stats);
            anchors.push(anchor);
        }

        if anchors.is_empty() {
            return Err(ContractError::missing_data(
                "timing map anchors",
                format!(
                    "none of {} marks satisfies {:?} selection",
                    marks.len(),
                    self.config.timing_map.selection
                ),
            ));
        }

        if !is_ascending(&anchors) {
            warn!("timing map anchors out of order, sorting by reference isotime");
            anchors.sort_by_key(|a| a.isotime);
        }

        stats.anchors = anchors.len();
        metrics::counter!("timing_anchors_built_total").increment(stats.anchors as u64);
        info!(
            anchors = stats.anchors,
            skipped_kind = stats.skipped_kind,
            skipped_incomplete = stats.skipped_incomplete,
            synthesized = stats.synthesized,
            "built timing map"
        );
        Ok((anchors, stats))
    }

    fn is_selected(&self, mark: &Mark) -> bool {
        let reference = self.config.reference_clock;
        if !mark.has_clock(reference) {
            return false;
        }
        match self.config.timing_map.selection {
            AnchorSelection::Strict => self
                .config
                .domains()
                .all(|clock| mark.has_clock(clock) || self.config.is_skipped(clock)),
            AnchorSelection::Extended => self.config.domains().any(|clock| mark.has_clock(clock)),
        }
    }

    fn anchor_from(
        &self,
        mark: &Mark,
        ref_isotime: chrono::NaiveDateTime,
        built: &[TimingMapAnchor],
        stats: &mut BuildStats,
    ) -> TimingMapAnchor {
        let reference = self.config.reference_clock;
        let ref_duration = mark.duration(reference);
        let ref_id = mark.sample(reference).and_then(|s| s.id.clone());

        let mut anchor = TimingMapAnchor {
            isotime: ref_isotime,
            duration: ref_duration,
            session_id: mark.session_id.clone(),
            mark_id: Some(mark.id.clone()),
            mark_name: Some(mark.name.clone()),
            clocks: Default::default(),
        };
        anchor
            .clocks
            .insert(reference.canonical(), ClockOffset::reference(ref_id, ref_isotime));

        for clock in self.config.domains() {
            let values = match (mark.sample(clock), self.config.is_skipped(clock)) {
                (Some(sample), _) if sample.is_present() => {
                    let isotime = sample.isotime;
                    ClockOffset {
                        id: sample.id.clone(),
                        isotime,
                        offset: isotime.map(|t| seconds_between(ref_isotime, t)),
                        deviation: deviation(sample.duration, ref_duration),
                    }
                }
                (_, true) => {
                    let service = self.synthesizer(clock, built);
                    self.synthesize(clock, ref_isotime, &service, &mark.id, stats)
                }
                _ => ClockOffset::default(),
            };
            anchor.clocks.insert(clock.canonical(), values);
        }
        anchor
    }

    /// Conversion service over the earlier anchors that measured `clock`
    fn synthesizer(&self, clock: Clock, built: &[TimingMapAnchor]) -> TimingMapService {
        let resolving = built
            .iter()
            .filter(|anchor| anchor.offset(clock).is_some())
            .cloned()
            .collect();
        TimingMapService::from_config(resolving, self.config)
    }

    /// Value of a skip-set clock derived from anchors built so far
    fn synthesize(
        &self,
        clock: Clock,
        ref_isotime: chrono::NaiveDateTime,
        service: &TimingMapService,
        mark_id: &str,
        stats: &mut BuildStats,
    ) -> ClockOffset {
        if service.is_empty() && service.calibration(clock).is_none() {
            warn!(
                clock = %clock,
                mark = %mark_id,
                "no earlier anchor resolves skipped clock, leaving it empty"
            );
            stats.unresolved += 1;
            return ClockOffset::default();
        }

        let isotime = service.convert(self.config.reference_clock, clock, Some(ref_isotime));
        debug!(
            clock = %clock,
            mark = %mark_id,
            isotime = ?isotime.map(|t| format_isotime(&t)),
            "synthesized skipped clock"
        );
        stats.synthesized += 1;
        ClockOffset {
            id: None,
            isotime,
            offset: isotime.map(|t| seconds_between(ref_isotime, t)),
            deviation: None,
        }
    }
}
