//! Configuration parsing
//!
//! TOML (primary) and JSON formats. Clock and time zone names are checked
//! against the document before the typed parse so that a typo reports the
//! key it sits under.

use std::str::FromStr;

use chrono_tz::Tz;
use contracts::{Clock, ContractError, TimingConfig};
use serde_json::Value;

/// Keys whose value is a single clock name
const CLOCK_KEYS: [&str; 1] = ["reference_clock"];

/// Keys whose value is a list of clock names
const CLOCK_LIST_KEYS: [&str; 5] = [
    "clocks",
    "skip_clocks",
    "matcher.noisy_clocks",
    "matcher.last_series_exempt",
    "matcher.coarse_clocks",
];

/// Tables keyed by clock name
const CLOCK_TABLE_KEYS: [&str; 2] = ["manual_offsets", "segmenter.intervals"];

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<TimingConfig, ContractError> {
    let document: Value = toml::from_str(content).map_err(toml_error)?;
    check_names(&document)?;
    toml::from_str(content).map_err(toml_error)
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<TimingConfig, ContractError> {
    let document: Value = serde_json::from_str(content).map_err(json_error)?;
    check_names(&document)?;
    serde_json::from_str(content).map_err(json_error)
}

/// Parse by format
pub fn parse(content: &str, format: ConfigFormat) -> Result<TimingConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

fn toml_error(e: toml::de::Error) -> ContractError {
    ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    }
}

fn json_error(e: serde_json::Error) -> ContractError {
    ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Check every clock and time zone name in a parsed document
fn check_names(document: &Value) -> Result<(), ContractError> {
    for key in CLOCK_KEYS {
        if let Some(Value::String(name)) = lookup(document, key) {
            check_clock(name, key)?;
        }
    }
    for key in CLOCK_LIST_KEYS {
        if let Some(Value::Array(items)) = lookup(document, key) {
            for (i, item) in items.iter().enumerate() {
                if let Value::String(name) = item {
                    check_clock(name, &format!("{key}[{i}]"))?;
                }
            }
        }
    }
    for key in CLOCK_TABLE_KEYS {
        if let Some(Value::Object(table)) = lookup(document, key) {
            for name in table.keys() {
                check_clock(name, &format!("{key}.{name}"))?;
            }
        }
    }
    if let Some(Value::String(name)) = lookup(document, "timezone") {
        if Tz::from_str(name).is_err() {
            return Err(ContractError::config_parse(format!(
                "unknown time zone `{name}` at `timezone` (expected an IANA name such as `{}`)",
                contracts::isotime::DEFAULT_TIMEZONE.name()
            )));
        }
    }
    Ok(())
}

/// Serde accepts only the exact lowercase names, so match on those
fn check_clock(name: &str, path: &str) -> Result<(), ContractError> {
    if Clock::ALL.iter().any(|clock| clock.as_str() == name) {
        return Ok(());
    }
    let known: Vec<&str> = Clock::ALL.iter().map(|clock| clock.as_str()).collect();
    Err(ContractError::config_parse(format!(
        "unknown clock `{name}` at `{path}` (expected one of: {})",
        known.join(", ")
    )))
}

/// Dotted key lookup
fn lookup<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(document, |value, part| value.get(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Clock;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
reference_clock = "birch"
clocks = ["birch", "dicoms"]
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.clocks, vec![Clock::Birch, Clock::Dicoms]);
        assert_eq!(config.segmenter.min_series_len, 6);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "reference_clock": "birch",
            "clocks": ["birch", "reprostim_video"],
            "matcher": { "noisy_clocks": ["reprostim_video"] }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.matcher.noisy_clocks, vec![Clock::ReprostimVideo]);
    }

    fn parse_error(result: Result<TimingConfig, ContractError>) -> String {
        match result {
            Err(ContractError::ConfigParse { message, .. }) => message,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_clock() {
        let message = parse_error(parse_toml(r#"reference_clock = "sundial""#));
        assert!(message.contains("`sundial` at `reference_clock`"), "{message}");
        assert!(message.contains("reprostim_video"), "{message}");
    }

    #[test]
    fn test_unknown_clock_reports_key_path() {
        let content = r#"
clocks = ["birch", "dicom"]
"#;
        let message = parse_error(parse_toml(content));
        assert!(message.contains("`dicom` at `clocks[1]`"), "{message}");

        let content = r#"
[matcher]
coarse_clocks = ["dicoms", "Psychopy"]
"#;
        let message = parse_error(parse_toml(content));
        assert!(message.contains("at `matcher.coarse_clocks[1]`"), "{message}");

        let content = r#"{"segmenter": {"intervals": {"birch": 2.0, "qr": 1.0}}}"#;
        let message = parse_error(parse_json(content));
        assert!(message.contains("`qr` at `segmenter.intervals.qr`"), "{message}");

        let content = r#"
[manual_offsets]
sundial = 0.5
"#;
        let message = parse_error(parse_toml(content));
        assert!(message.contains("at `manual_offsets.sundial`"), "{message}");
    }

    #[test]
    fn test_unknown_timezone_reports_key() {
        let message = parse_error(parse_toml(r#"timezone = "Mars/Olympus""#));
        assert!(message.contains("`Mars/Olympus` at `timezone`"), "{message}");

        let config = parse_toml(r#"timezone = "Europe/Berlin""#).unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_type_errors_keep_format_message() {
        let message = parse_error(parse_toml("[segmenter]\nmin_series_len = \"six\"\n"));
        assert!(message.starts_with("TOML parse error"), "{message}");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
