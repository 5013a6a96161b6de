//! Clock - identifier of one independently-timestamped event source
//!
//! Fixed enumerable set. `Isotime` is the anchor's own reference time axis and
//! never carries an offset of its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Clock domain identifier.
///
/// `ReprostimVideo` is the same physical clock as `Qrinfo` (the video timecode
/// reader); both resolve to the `qrinfo` column of a timing map.
///
/// # Examples
/// ```
/// use contracts::Clock;
///
/// let clock: Clock = "dicoms".parse().unwrap();
/// assert_eq!(clock, Clock::Dicoms);
/// assert_eq!(Clock::ReprostimVideo.canonical(), Clock::Qrinfo);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Clock {
    /// Reference time axis of the timing map
    Isotime,
    /// GPIO timing recorder
    Birch,
    /// Imaging device acquisition clock
    Dicoms,
    /// Stimulus-presentation client
    Psychopy,
    /// Video-derived timecode reader
    Qrinfo,
    /// Alias of `Qrinfo`
    ReprostimVideo,
    /// Event-logging controller
    Reproevents,
}

impl Clock {
    /// Every clock, `Isotime` first.
    pub const ALL: [Clock; 7] = [
        Clock::Isotime,
        Clock::Birch,
        Clock::Dicoms,
        Clock::Psychopy,
        Clock::Qrinfo,
        Clock::ReprostimVideo,
        Clock::Reproevents,
    ];

    /// Clocks that own a column in mark and timing-map records.
    pub const COLUMNS: [Clock; 5] = [
        Clock::Birch,
        Clock::Dicoms,
        Clock::Psychopy,
        Clock::Qrinfo,
        Clock::Reproevents,
    ];

    /// Lowercase name used in records and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Clock::Isotime => "isotime",
            Clock::Birch => "birch",
            Clock::Dicoms => "dicoms",
            Clock::Psychopy => "psychopy",
            Clock::Qrinfo => "qrinfo",
            Clock::ReprostimVideo => "reprostim_video",
            Clock::Reproevents => "reproevents",
        }
    }

    /// Resolve aliases to the clock that owns the record column.
    pub fn canonical(self) -> Clock {
        match self {
            Clock::ReprostimVideo => Clock::Qrinfo,
            other => other,
        }
    }

    /// Whether this is the reference time axis itself.
    pub fn is_isotime(&self) -> bool {
        matches!(self, Clock::Isotime)
    }

    /// Record key for a per-clock field, e.g. `dicoms_offset`.
    pub fn field(&self, suffix: &str) -> String {
        format!("{}_{}", self.canonical().as_str(), suffix)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Clock {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Clock::ALL
            .iter()
            .copied()
            .find(|clock| clock.as_str() == lowered)
            .ok_or_else(|| ContractError::UnknownClock(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for clock in Clock::ALL {
            assert_eq!(clock.as_str().parse::<Clock>().unwrap(), clock);
        }
        assert_eq!("DICOMS".parse::<Clock>().unwrap(), Clock::Dicoms);
    }

    #[test]
    fn test_unknown_clock() {
        let err = "sundial".parse::<Clock>().unwrap_err();
        assert!(err.to_string().contains("sundial"));
    }

    #[test]
    fn test_alias_shares_column() {
        assert_eq!(Clock::ReprostimVideo.field("offset"), "qrinfo_offset");
        assert_eq!(Clock::Qrinfo.field("offset"), "qrinfo_offset");
        assert_eq!(Clock::Birch.field("isotime"), "birch_isotime");
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Clock::ReprostimVideo).unwrap();
        assert_eq!(json, "\"reprostim_video\"");
        let parsed: Clock = serde_json::from_str("\"psychopy\"").unwrap();
        assert_eq!(parsed, Clock::Psychopy);
    }
}
