//! Timing configuration contracts shared across crates.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Clock, MarkKind};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete timing pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Configuration version
    pub version: ConfigVersion,

    /// Reference clock (zero offset)
    pub reference_clock: Clock,

    /// Clock domains taking part in the session, in matching priority order
    pub clocks: Vec<Clock>,

    /// Clocks exempt from "must be present" when selecting anchors
    pub skip_clocks: Vec<Clock>,

    /// Session time zone; offset-aware timestamps are converted into it
    pub timezone: Tz,

    /// Manual calibration offsets (seconds from the reference axis)
    pub manual_offsets: BTreeMap<Clock, f64>,

    /// Series segmentation
    pub segmenter: SegmenterConfig,

    /// Series matching
    pub matcher: MatcherConfig,

    /// Mark generation
    pub marks: MarkConfig,

    /// Timing map building
    pub timing_map: TimingMapConfig,

    /// Clock conversion
    pub conversion: ConversionConfig,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            reference_clock: Clock::Birch,
            clocks: vec![Clock::Birch, Clock::Dicoms, Clock::Qrinfo, Clock::Psychopy],
            skip_clocks: Vec::new(),
            manual_offsets: BTreeMap::new(),
            timezone: crate::isotime::DEFAULT_TIMEZONE,
            segmenter: SegmenterConfig::default(),
            matcher: MatcherConfig::default(),
            marks: MarkConfig::default(),
            timing_map: TimingMapConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

impl TimingConfig {
    /// Configured clocks other than the reference, in priority order
    pub fn domains(&self) -> impl Iterator<Item = Clock> + '_ {
        self.clocks
            .iter()
            .copied()
            .filter(move |c| c.canonical() != self.reference_clock.canonical())
    }

    /// Whether a clock is exempt from "must be present"
    pub fn is_skipped(&self, clock: Clock) -> bool {
        contains(&self.skip_clocks, clock)
    }

    /// Manual calibration offset for a clock, if configured
    pub fn manual_offset(&self, clock: Clock) -> Option<f64> {
        self.manual_offsets
            .iter()
            .find(|(c, _)| c.canonical() == clock.canonical())
            .map(|(_, offset)| *offset)
    }
}

/// Alias-aware membership test for clock lists
pub fn contains(clocks: &[Clock], clock: Clock) -> bool {
    clocks.iter().any(|c| c.canonical() == clock.canonical())
}

/// Series segmentation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Nominal interval per clock (seconds)
    pub intervals: BTreeMap<Clock, f64>,
    /// Interval used for clocks without an entry (seconds)
    pub default_interval: f64,
    /// Lower gap tolerance factor
    pub tolerance_low: f64,
    /// Upper gap tolerance factor
    pub tolerance_high: f64,
    /// Shortest run kept as a series
    pub min_series_len: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            intervals: BTreeMap::new(),
            default_interval: 2.0,
            tolerance_low: 0.8,
            tolerance_high: 1.2,
            min_series_len: 6,
        }
    }
}

impl SegmenterConfig {
    /// Nominal interval for a clock
    pub fn interval_for(&self, clock: Clock) -> f64 {
        self.intervals
            .iter()
            .find(|(c, _)| c.canonical() == clock.canonical())
            .map(|(_, interval)| *interval)
            .unwrap_or(self.default_interval)
    }
}

/// Series matching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Relative interval tolerance
    pub interval_tolerance: f64,
    /// Relative interval tolerance when a noisy clock is involved
    pub noisy_interval_tolerance: f64,
    /// Clocks with jittery timestamps
    pub noisy_clocks: Vec<Clock>,
    /// Clocks exempt from the "last series on one side only" rejection
    pub last_series_exempt: Vec<Clock>,
    /// Maximum start-time difference (seconds)
    pub start_threshold_s: f64,
    /// Maximum start-time difference when a coarse clock is involved (seconds)
    pub coarse_start_threshold_s: f64,
    /// Clocks with coarse timestamps or large uncalibrated offsets
    pub coarse_clocks: Vec<Clock>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            interval_tolerance: 0.05,
            noisy_interval_tolerance: 0.20,
            noisy_clocks: vec![Clock::Qrinfo],
            last_series_exempt: Vec::new(),
            start_threshold_s: 2.0,
            coarse_start_threshold_s: 120.0,
            coarse_clocks: vec![Clock::Dicoms],
        }
    }
}

/// Mark generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkConfig {
    /// Chain each domain against the previously matched domain's series
    pub chain_matches: bool,
    /// Retroactive loose matching of raw events for marks missing a clock
    pub loose_matching: bool,
    /// Half-width of the loose matching window (seconds)
    pub loose_window_s: f64,
}

impl Default for MarkConfig {
    fn default() -> Self {
        Self {
            chain_matches: true,
            loose_matching: false,
            loose_window_s: 0.9,
        }
    }
}

/// Anchor selection mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSelection {
    /// Every configured clock present or skip-set exempt
    #[default]
    Strict,
    /// Reference clock plus at least one other clock present
    Extended,
}

/// Timing map building configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingMapConfig {
    /// Anchor selection mode
    pub selection: AnchorSelection,
    /// Mark kinds eligible as anchors
    pub anchor_kinds: Vec<MarkKind>,
}

impl Default for TimingMapConfig {
    fn default() -> Self {
        Self {
            selection: AnchorSelection::Strict,
            anchor_kinds: MarkKind::ALL.to_vec(),
        }
    }
}

/// Conversion mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Offset of the nearest previous anchor
    #[default]
    Hold,
    /// Offset linearly interpolated between bracketing anchors
    Interpolate,
}

/// Clock conversion configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub mode: ConversionMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TimingConfig::default();
        assert_eq!(config.reference_clock, Clock::Birch);
        assert_eq!(
            config.domains().collect::<Vec<_>>(),
            vec![Clock::Dicoms, Clock::Qrinfo, Clock::Psychopy]
        );
        assert_eq!(config.segmenter.interval_for(Clock::Dicoms), 2.0);
        assert!(!config.marks.loose_matching);
        assert_eq!(config.conversion.mode, ConversionMode::Hold);
    }

    #[test]
    fn test_alias_aware_lookups() {
        let mut config = TimingConfig::default();
        config.skip_clocks = vec![Clock::ReprostimVideo];
        config.manual_offsets.insert(Clock::Qrinfo, 0.3);
        assert!(config.is_skipped(Clock::Qrinfo));
        assert_eq!(config.manual_offset(Clock::ReprostimVideo), Some(0.3));
        assert!(contains(&config.matcher.noisy_clocks, Clock::ReprostimVideo));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"reference_clock":"dicoms","timing_map":{"selection":"extended"}}"#;
        let config: TimingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.reference_clock, Clock::Dicoms);
        assert_eq!(config.timing_map.selection, AnchorSelection::Extended);
        assert_eq!(config.timing_map.anchor_kinds.len(), 3);
        assert_eq!(config.segmenter.min_series_len, 6);
    }

    #[test]
    fn test_timezone_by_name() {
        assert_eq!(TimingConfig::default().timezone, chrono_tz::America::New_York);

        let config: TimingConfig = serde_json::from_str(r#"{"timezone":"Europe/Berlin"}"#).unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
        assert!(serde_json::from_str::<TimingConfig>(r#"{"timezone":"Mars/Olympus"}"#).is_err());
    }
}
