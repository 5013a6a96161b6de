//! Study-range filtering
//!
//! A study range is expressed on the reference clock. Before filtering a
//! domain's events it is mapped into that domain with a caller-supplied
//! conversion.

use std::path::Path;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use contracts::isotime::{format_isotime, parse_isotime_in};
use contracts::{ContractError, Event};
use tracing::{debug, instrument, warn};

use crate::reader::read_jsonl;

/// Inclusive time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl StudyRange {
    /// Create a range; bounds are swapped if given in reverse
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Whether `t` lies within `[start, end]`
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }

    /// Map both bounds into another clock domain.
    ///
    /// Returns `None` if either bound cannot be converted.
    pub fn map<F>(&self, convert: F) -> Option<StudyRange>
    where
        F: Fn(NaiveDateTime) -> Option<NaiveDateTime>,
    {
        Some(StudyRange::new(convert(self.start)?, convert(self.end)?))
    }

    /// Keep only events inside the range; returns the number dropped
    pub fn retain(&self, events: &mut Vec<Event>) -> usize {
        let before = events.len();
        events.retain(|e| {
            let inside = self.contains(e.isotime);
            if !inside {
                debug!(
                    id = %e.id,
                    isotime = %format_isotime(&e.isotime),
                    "skipping out of study range"
                );
            }
            inside
        });
        before - events.len()
    }
}

/// Find the study range recorded in a dump file.
///
/// Looks for a `StudyRecord` (optionally with the given `name`) carrying
/// `range_isotime_start` and `range_isotime_end`. Returns `None` when no
/// such record exists. Offset-aware bounds are converted to `tz`.
#[instrument(name = "ingestion_find_study_range", skip_all, fields(path = %path.display()))]
pub fn find_study_range(
    path: &Path,
    name: Option<&str>,
    tz: Tz,
) -> Result<Option<StudyRange>, ContractError> {
    let (lines, _) = read_jsonl(path)?;

    for line in lines {
        let value = &line.value;
        if value.get("type").and_then(|t| t.as_str()) != Some("StudyRecord") {
            continue;
        }
        if let Some(name) = name {
            if value.get("name").and_then(|n| n.as_str()) != Some(name) {
                continue;
            }
        }

        let start = value.get("range_isotime_start").and_then(|v| v.as_str());
        let end = value.get("range_isotime_end").and_then(|v| v.as_str());
        match (start, end) {
            (Some(start), Some(end)) => {
                let range =
                    StudyRange::new(parse_isotime_in(start, tz)?, parse_isotime_in(end, tz)?);
                debug!(
                    start = %format_isotime(&range.start),
                    end = %format_isotime(&range.end),
                    "found study range"
                );
                return Ok(Some(range));
            }
            _ => {
                warn!(line = line.line, "study record without range bounds");
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::isotime::{parse_isotime, shift, DEFAULT_TIMEZONE};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn t(s: &str) -> NaiveDateTime {
        parse_isotime(s).unwrap()
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = StudyRange::new(t("2024-06-04T13:00:00"), t("2024-06-04T14:00:00"));
        assert!(range.contains(t("2024-06-04T13:00:00")));
        assert!(range.contains(t("2024-06-04T14:00:00")));
        assert!(!range.contains(t("2024-06-04T14:00:00.000001")));
    }

    #[test]
    fn test_reversed_bounds_are_swapped() {
        let range = StudyRange::new(t("2024-06-04T14:00:00"), t("2024-06-04T13:00:00"));
        assert_eq!(range.start, t("2024-06-04T13:00:00"));
    }

    #[test]
    fn test_retain_and_map() {
        let range = StudyRange::new(t("2024-06-04T13:00:00"), t("2024-06-04T13:00:10"));
        let shifted = range.map(|x| Some(shift(x, 372.0))).unwrap();
        assert_eq!(shifted.start, t("2024-06-04T13:06:12"));

        let mut events = vec![
            Event::new("a", t("2024-06-04T13:06:11")),
            Event::new("b", t("2024-06-04T13:06:15")),
            Event::new("c", t("2024-06-04T13:06:22")),
            Event::new("d", t("2024-06-04T13:06:23")),
        ];
        assert_eq!(shifted.retain(&mut events), 2);
        assert_eq!(events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);

        assert!(range.map(|_| None).is_none());
    }

    #[test]
    fn test_find_study_range() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"dicom_000001","isotime":"2024-06-04T14:00:31.5"}}"#).unwrap();
        writeln!(file, r#"{{"type":"StudyRecord","name":"other"}}"#).unwrap();
        writeln!(
            file,
            r#"{{"type":"StudyRecord","name":"dbic^QA",{},{}}}"#,
            r#""range_isotime_start":"2024-06-04T13:50:00""#,
            r#""range_isotime_end":"2024-06-04T15:10:00""#
        )
        .unwrap();

        let range = find_study_range(file.path(), Some("dbic^QA"), DEFAULT_TIMEZONE)
            .unwrap()
            .unwrap();
        assert_eq!(range.start, t("2024-06-04T13:50:00"));
        assert_eq!(range.end, t("2024-06-04T15:10:00"));

        assert!(find_study_range(file.path(), Some("missing"), DEFAULT_TIMEZONE)
            .unwrap()
            .is_none());
    }
}
