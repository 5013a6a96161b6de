//! Clock conversion service.
//!
//! Translates a timestamp between clock domains using a loaded timing map.
//! Built once per run; manual calibration is applied at load time.

use std::cell::Cell;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use contracts::isotime::{format_isotime, seconds_between, shift};
use contracts::{Clock, ConversionMode, TimingConfig, TimingMapAnchor};
use tracing::{debug, trace, warn};

/// Timing map backed clock converter
#[derive(Debug, Clone, Default)]
pub struct TimingMapService {
    /// Anchors ascending by reference isotime
    anchors: Vec<TimingMapAnchor>,
    /// Manual calibration offsets, keyed by canonical clock
    overrides: BTreeMap<Clock, f64>,
    mode: ConversionMode,
    /// Conversions made without any anchor
    fallbacks: Cell<u64>,
}

impl TimingMapService {
    /// Service over a set of anchors.
    ///
    /// Anchors are stably sorted by reference isotime.
    pub fn new(mut anchors: Vec<TimingMapAnchor>) -> Self {
        if !is_ascending(&anchors) {
            debug!(anchors = anchors.len(), "sorting timing map anchors");
            anchors.sort_by_key(|a| a.isotime);
        }
        Self {
            anchors,
            overrides: BTreeMap::new(),
            mode: ConversionMode::Hold,
            fallbacks: Cell::new(0),
        }
    }

    /// Service without anchors; conversions fall back to identity
    pub fn empty() -> Self {
        Self::default()
    }

    /// Service configured from a `TimingConfig` (mode and calibration)
    pub fn from_config(anchors: Vec<TimingMapAnchor>, config: &TimingConfig) -> Self {
        Self::new(anchors)
            .with_mode(config.conversion.mode)
            .with_calibration(&config.manual_offsets)
    }

    pub fn with_mode(mut self, mode: ConversionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply manual calibration offsets.
    ///
    /// A calibrated clock uses the given offset at every anchor, replacing
    /// the measured one. Applies to an empty map too.
    pub fn with_calibration(mut self, offsets: &BTreeMap<Clock, f64>) -> Self {
        for (clock, offset) in offsets {
            if clock.is_isotime() {
                warn!("ignoring calibration offset for the reference axis");
                continue;
            }
            debug!(clock = %clock, offset, "applying manual calibration");
            self.overrides.insert(clock.canonical(), *offset);
        }
        self
    }

    pub fn anchors(&self) -> &[TimingMapAnchor] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    /// Calibration offset of a clock, if overridden
    pub fn calibration(&self, clock: Clock) -> Option<f64> {
        self.overrides.get(&clock.canonical()).copied()
    }

    /// Anchor governing time `t`: the last anchor with `isotime <= t`, or the
    /// first anchor when `t` precedes all of them.
    pub fn find_anchor(&self, t: NaiveDateTime) -> Option<&TimingMapAnchor> {
        self.find_index(t).map(|idx| &self.anchors[idx])
    }

    fn find_index(&self, t: NaiveDateTime) -> Option<usize> {
        if self.anchors.is_empty() {
            return None;
        }
        let after = self.anchors.partition_point(|a| a.isotime <= t);
        Some(after.saturating_sub(1))
    }

    /// Convert a timestamp from one clock to another.
    ///
    /// Identity for the same clock (after alias resolution) and for `None`
    /// input. An empty map without calibration returns the input unchanged
    /// and warns on the first such conversion only.
    pub fn convert(
        &self,
        from: Clock,
        to: Clock,
        t: Option<NaiveDateTime>,
    ) -> Option<NaiveDateTime> {
        if from.canonical() == to.canonical() {
            return t;
        }
        let t = t?;
        let offset = self.offset_between(from, to, t);
        let converted = shift(t, offset);
        trace!(
            from = %from,
            to = %to,
            offset,
            input = %format_isotime(&t),
            output = %format_isotime(&converted),
            "converted timestamp"
        );
        Some(converted)
    }

    /// Seconds to add to a `from`-clock time to express it in `to`
    pub fn offset_between(&self, from: Clock, to: Clock, t: NaiveDateTime) -> f64 {
        if from.canonical() == to.canonical() {
            return 0.0;
        }

        let Some(idx) = self.find_index(t) else {
            self.record_fallback(t);
            return self.override_or_zero(to) - self.override_or_zero(from);
        };

        match self.mode {
            ConversionMode::Hold => self.anchor_offset(idx, to) - self.anchor_offset(idx, from),
            ConversionMode::Interpolate => {
                self.interpolated_offset(idx, to, t) - self.interpolated_offset(idx, from, t)
            }
        }
    }

    /// Number of conversions made without an anchor
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.get()
    }

    /// Warn on the first anchorless conversion only; an empty map stays
    /// empty for the life of the service.
    fn record_fallback(&self, t: NaiveDateTime) {
        let count = self.fallbacks.get() + 1;
        self.fallbacks.set(count);
        if count == 1 {
            warn!(
                calibrated = self.overrides.len(),
                "timing map is empty, converting with calibration offsets only"
            );
            metrics::counter!("timing_missing_anchor_total").increment(1);
        } else {
            trace!(time = %format_isotime(&t), "no timing map anchor");
        }
    }

    fn override_or_zero(&self, clock: Clock) -> f64 {
        self.calibration(clock).unwrap_or(0.0)
    }

    /// Offset of `clock` at anchor `idx`, calibration first
    fn anchor_offset(&self, idx: usize, clock: Clock) -> f64 {
        if clock.is_isotime() {
            return 0.0;
        }
        if let Some(offset) = self.calibration(clock) {
            return offset;
        }
        let anchor = &self.anchors[idx];
        match anchor.offset(clock) {
            Some(offset) => offset,
            None => {
                warn!(
                    clock = %clock,
                    anchor = %format_isotime(&anchor.isotime),
                    "anchor has no offset for clock, assuming 0.0"
                );
                0.0
            }
        }
    }

    /// Offset linearly interpolated between anchors `idx` and `idx + 1` when
    /// `t` lies in `[a, b)`, held otherwise
    fn interpolated_offset(&self, idx: usize, clock: Clock, t: NaiveDateTime) -> f64 {
        let held = self.anchor_offset(idx, clock);
        if clock.is_isotime() || self.calibration(clock).is_some() {
            return held;
        }

        let a = &self.anchors[idx];
        let Some(b) = self.anchors.get(idx + 1) else {
            return held;
        };
        if t < a.isotime || t >= b.isotime {
            return held;
        }
        let (Some(off_a), Some(off_b)) = (a.offset(clock), b.offset(clock)) else {
            return held;
        };

        let span = seconds_between(a.isotime, b.isotime);
        if span <= 0.0 {
            return held;
        }
        let ratio = seconds_between(a.isotime, t) / span;
        off_a + (off_b - off_a) * ratio
    }

    /// Diagnostic summary, e.g.
    /// `TMap marks count 2 : [0]=2024-06-04T13:54:19.385115, [1]=...`
    pub fn to_label(&self) -> String {
        if self.anchors.is_empty() {
            return "TMap is empty".to_string();
        }
        let items = self
            .anchors
            .iter()
            .enumerate()
            .map(|(i, a)| format!("[{i}]={}", format_isotime(&a.isotime)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("TMap marks count {} : {items}", self.anchors.len())
    }
}

/// Whether anchors are ascending by reference isotime
pub fn is_ascending(anchors: &[TimingMapAnchor]) -> bool {
    anchors.windows(2).all(|w| w[0].isotime <= w[1].isotime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::isotime::parse_isotime;
    use contracts::ClockOffset;

    fn t(s: &str) -> NaiveDateTime {
        parse_isotime(s).unwrap()
    }

    fn anchor(isotime: &str, offsets: &[(Clock, f64)]) -> TimingMapAnchor {
        let isotime = t(isotime);
        let clocks = offsets
            .iter()
            .map(|(clock, offset)| {
                (
                    clock.canonical(),
                    ClockOffset {
                        id: None,
                        isotime: Some(shift(isotime, *offset)),
                        offset: Some(*offset),
                        deviation: Some(1.0),
                    },
                )
            })
            .collect();
        TimingMapAnchor {
            isotime,
            duration: None,
            session_id: None,
            mark_id: None,
            mark_name: None,
            clocks,
        }
    }

    fn session_map() -> TimingMapService {
        TimingMapService::new(vec![anchor(
            "2024-06-04T13:54:19.385115",
            &[
                (Clock::Birch, 0.0),
                (Clock::Dicoms, 372.122385),
                (Clock::Psychopy, -0.015225999999999962),
                (Clock::Qrinfo, 0.317885),
            ],
        )])
    }

    #[test]
    fn test_session_conversions() {
        let svc = session_map();
        let dt = Some(t("2024-06-04T13:54:19.385115"));
        assert_eq!(
            svc.convert(Clock::Isotime, Clock::Dicoms, dt),
            Some(t("2024-06-04T14:00:31.507500"))
        );
        assert_eq!(
            svc.convert(Clock::Isotime, Clock::Psychopy, dt),
            Some(t("2024-06-04T13:54:19.369889"))
        );
        assert_eq!(
            svc.convert(Clock::Birch, Clock::ReprostimVideo, dt),
            Some(t("2024-06-04T13:54:19.703000"))
        );
    }

    #[test]
    fn test_identity_for_same_clock_and_none() {
        let svc = session_map();
        let dt = Some(t("2024-06-04T15:00:00"));
        for clock in Clock::ALL {
            assert_eq!(svc.convert(clock, clock, dt), dt);
            assert_eq!(svc.convert(clock, clock, None), None);
        }
        assert_eq!(svc.convert(Clock::Qrinfo, Clock::ReprostimVideo, dt), dt);
        assert_eq!(svc.convert(Clock::Birch, Clock::Dicoms, None), None);
    }

    #[test]
    fn test_round_trip() {
        let svc = session_map();
        let dt = Some(t("2024-06-04T14:10:00.123456"));
        for (a, b) in [
            (Clock::Dicoms, Clock::Psychopy),
            (Clock::Birch, Clock::Qrinfo),
            (Clock::Isotime, Clock::Dicoms),
        ] {
            let there = svc.convert(a, b, dt);
            assert_eq!(svc.convert(b, a, there), dt);
        }
    }

    #[test]
    fn test_reverse_conversion_with_large_offset() {
        let t0 = t("2024-06-04T13:54:19.385115");
        let svc = TimingMapService::new(vec![anchor(
            "2024-06-04T13:54:19.385115",
            &[(Clock::Birch, 0.0), (Clock::Dicoms, 372.122385)],
        )]);
        let converted = svc
            .convert(Clock::Dicoms, Clock::Birch, Some(shift(t0, 372.122385)))
            .unwrap();
        assert!(seconds_between(t0, converted).abs() < 1e-6);
    }

    #[test]
    fn test_find_anchor_brackets() {
        let svc = TimingMapService::new(vec![
            anchor("2024-06-04T14:00:00", &[(Clock::Dicoms, 2.0)]),
            anchor("2024-06-04T13:00:00", &[(Clock::Dicoms, 1.0)]),
            anchor("2024-06-04T15:00:00", &[(Clock::Dicoms, 3.0)]),
        ]);
        let at = |s: &str| svc.find_anchor(t(s)).map(|a| a.isotime);

        assert_eq!(at("2024-06-04T12:00:00"), Some(t("2024-06-04T13:00:00")));
        assert_eq!(at("2024-06-04T13:00:00"), Some(t("2024-06-04T13:00:00")));
        assert_eq!(at("2024-06-04T13:59:59.999999"), Some(t("2024-06-04T13:00:00")));
        assert_eq!(at("2024-06-04T14:00:00"), Some(t("2024-06-04T14:00:00")));
        assert_eq!(at("2024-06-04T18:00:00"), Some(t("2024-06-04T15:00:00")));
    }

    #[test]
    fn test_empty_map_is_identity() {
        let svc = TimingMapService::empty();
        let dt = Some(t("2024-06-04T13:54:19.385115"));
        assert!(svc.find_anchor(t("2024-06-04T13:54:19")).is_none());
        assert_eq!(svc.convert(Clock::Birch, Clock::Dicoms, dt), dt);
        assert_eq!(svc.to_label(), "TMap is empty");
    }

    #[test]
    fn test_empty_map_fallbacks_counted_not_repeated() {
        let svc = TimingMapService::empty();
        let dt = Some(t("2024-06-04T13:54:19.385115"));
        for _ in 0..3 {
            assert_eq!(svc.convert(Clock::Dicoms, Clock::Isotime, dt), dt);
        }
        // same clock and None inputs never reach the map
        assert_eq!(svc.convert(Clock::Dicoms, Clock::Dicoms, dt), dt);
        assert_eq!(svc.convert(Clock::Dicoms, Clock::Birch, None), None);
        assert_eq!(svc.fallbacks(), 3);

        assert_eq!(session_map().fallbacks(), 0);
    }

    #[test]
    fn test_calibration_overrides_measured_offset() {
        let mut offsets = BTreeMap::new();
        offsets.insert(Clock::ReprostimVideo, 1.0);
        let svc = session_map().with_calibration(&offsets);
        assert_eq!(svc.calibration(Clock::Qrinfo), Some(1.0));
        assert_eq!(
            svc.convert(Clock::Birch, Clock::Qrinfo, Some(t("2024-06-04T13:54:19"))),
            Some(t("2024-06-04T13:54:20"))
        );

        let empty = TimingMapService::empty().with_calibration(&offsets);
        assert_eq!(
            empty.convert(Clock::Qrinfo, Clock::Birch, Some(t("2024-06-04T13:54:20"))),
            Some(t("2024-06-04T13:54:19"))
        );
    }

    #[test]
    fn test_missing_clock_offset_is_zero() {
        let svc = TimingMapService::new(vec![anchor(
            "2024-06-04T13:00:00",
            &[(Clock::Dicoms, 10.0)],
        )]);
        assert_eq!(
            svc.convert(Clock::Reproevents, Clock::Dicoms, Some(t("2024-06-04T13:00:00"))),
            Some(t("2024-06-04T13:00:10"))
        );
    }

    #[test]
    fn test_interpolate_between_anchors() {
        let anchors = vec![
            anchor("2024-06-04T13:00:00", &[(Clock::Dicoms, 10.0)]),
            anchor("2024-06-04T13:01:40", &[(Clock::Dicoms, 11.0)]),
        ];
        let hold = TimingMapService::new(anchors.clone());
        let lerp = TimingMapService::new(anchors).with_mode(ConversionMode::Interpolate);
        let mid = Some(t("2024-06-04T13:00:50"));

        assert_eq!(
            hold.convert(Clock::Isotime, Clock::Dicoms, mid),
            Some(t("2024-06-04T13:01:00"))
        );
        assert_eq!(
            lerp.convert(Clock::Isotime, Clock::Dicoms, mid),
            Some(t("2024-06-04T13:01:00.500000"))
        );
        // outside the bracket: hold
        assert_eq!(
            lerp.convert(Clock::Isotime, Clock::Dicoms, Some(t("2024-06-04T13:05:00"))),
            Some(t("2024-06-04T13:05:11"))
        );
    }

    #[test]
    fn test_label() {
        let svc = TimingMapService::new(vec![
            anchor("2024-06-04T13:00:00", &[]),
            anchor("2024-06-04T13:01:40.5", &[]),
        ]);
        assert_eq!(
            svc.to_label(),
            "TMap marks count 2 : [0]=2024-06-04T13:00:00.000000, [1]=2024-06-04T13:01:40.500000"
        );
    }
}
