//! Isotime helpers
//!
//! Session timestamps are naive wall-clock datetimes with microsecond
//! resolution, expressed in the session time zone. Offset-aware input is
//! converted into that zone before the offset is dropped. Arithmetic is done
//! in seconds (f64) and applied with nanosecond rounding so that shifting
//! forward and back by the same offset returns the original instant.

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;

use crate::ContractError;

/// Output format, e.g. `2024-06-04T13:54:19.385115`
pub const ISOTIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Session time zone used when none is configured
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

const PARSE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp in the default session time zone.
///
/// See [`parse_isotime_in`].
pub fn parse_isotime(value: &str) -> Result<NaiveDateTime, ContractError> {
    parse_isotime_in(value, DEFAULT_TIMEZONE)
}

/// Parse a timestamp.
///
/// Accepts naive ISO-8601 with `T` or space separator and any fraction
/// length; naive input is taken as already local to `tz`. Offset-aware
/// RFC 3339 input is converted to `tz` wall-clock time.
pub fn parse_isotime_in(value: &str, tz: Tz) -> Result<NaiveDateTime, ContractError> {
    let value = value.trim();
    for format in PARSE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&tz).naive_local())
        .map_err(|e| ContractError::InvalidIsotime {
            value: value.to_string(),
            message: e.to_string(),
        })
}

/// Format a timestamp with microsecond precision.
pub fn format_isotime(value: &NaiveDateTime) -> String {
    value.format(ISOTIME_FORMAT).to_string()
}

/// `later - earlier` in seconds.
pub fn seconds_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    let delta = later - earlier;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// Shift a timestamp by a signed number of seconds.
pub fn shift(value: NaiveDateTime, seconds: f64) -> NaiveDateTime {
    if !seconds.is_finite() {
        return value;
    }
    value + TimeDelta::nanoseconds((seconds * 1e9).round() as i64)
}

/// Serde adapter for `NaiveDateTime` fields.
pub mod serde_isotime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_isotime(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_isotime(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<NaiveDateTime>` fields.
///
/// Empty strings and `null` both read as `None`.
pub mod serde_isotime_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&super::format_isotime(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.trim().is_empty() => super::parse_isotime(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
