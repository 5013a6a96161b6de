//! Configuration validation
//!
//! Rules:
//! - clock lists hold no duplicates and never name `isotime`
//! - reference clock is configured and not skip-set
//! - segmenter tolerances bracket 1.0, intervals are positive
//! - matcher tolerances and thresholds are positive
//! - manual offsets are finite

use std::collections::HashSet;

use contracts::{Clock, ContractError, TimingConfig};

/// Validate a TimingConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &TimingConfig) -> Result<(), ContractError> {
    validate_clocks(config)?;
    validate_reference(config)?;
    validate_segmenter(config)?;
    validate_matcher(config)?;
    validate_marks(config)?;
    validate_manual_offsets(config)?;
    Ok(())
}

/// Clock list uniqueness (alias aware)
fn validate_clocks(config: &TimingConfig) -> Result<(), ContractError> {
    if config.clocks.is_empty() {
        return Err(ContractError::config_validation(
            "clocks",
            "at least one clock must be configured",
        ));
    }

    let mut seen = HashSet::new();
    for clock in &config.clocks {
        if clock.is_isotime() {
            return Err(ContractError::config_validation(
                "clocks",
                "isotime is the reference axis, not a clock domain",
            ));
        }
        if !seen.insert(clock.canonical()) {
            return Err(ContractError::config_validation(
                format!("clocks[{clock}]"),
                "duplicate clock",
            ));
        }
    }
    Ok(())
}

/// Reference clock must be a configured, non-skipped domain
fn validate_reference(config: &TimingConfig) -> Result<(), ContractError> {
    let reference = config.reference_clock;
    if reference.is_isotime() {
        return Err(ContractError::config_validation(
            "reference_clock",
            "isotime cannot be the reference clock",
        ));
    }
    if !contracts::contains(&config.clocks, reference) {
        return Err(ContractError::config_validation(
            "reference_clock",
            format!("reference clock '{reference}' not found in clocks"),
        ));
    }
    if config.is_skipped(reference) {
        return Err(ContractError::config_validation(
            "skip_clocks",
            format!("reference clock '{reference}' cannot be skipped"),
        ));
    }
    Ok(())
}

fn validate_segmenter(config: &TimingConfig) -> Result<(), ContractError> {
    let seg = &config.segmenter;

    if !(seg.tolerance_low > 0.0 && seg.tolerance_low < 1.0) {
        return Err(ContractError::config_validation(
            "segmenter.tolerance_low",
            format!("tolerance_low must be in (0, 1), got {}", seg.tolerance_low),
        ));
    }
    if !(seg.tolerance_high > 1.0 && seg.tolerance_high.is_finite()) {
        return Err(ContractError::config_validation(
            "segmenter.tolerance_high",
            format!("tolerance_high must be > 1, got {}", seg.tolerance_high),
        ));
    }
    if seg.min_series_len < 2 {
        return Err(ContractError::config_validation(
            "segmenter.min_series_len",
            format!("min_series_len must be >= 2, got {}", seg.min_series_len),
        ));
    }
    check_positive("segmenter.default_interval", seg.default_interval)?;
    for (clock, interval) in &seg.intervals {
        check_positive(&format!("segmenter.intervals.{clock}"), *interval)?;
    }
    Ok(())
}

fn validate_matcher(config: &TimingConfig) -> Result<(), ContractError> {
    let m = &config.matcher;
    check_positive("matcher.interval_tolerance", m.interval_tolerance)?;
    check_positive("matcher.noisy_interval_tolerance", m.noisy_interval_tolerance)?;
    check_positive("matcher.start_threshold_s", m.start_threshold_s)?;
    check_positive("matcher.coarse_start_threshold_s", m.coarse_start_threshold_s)?;
    Ok(())
}

fn validate_marks(config: &TimingConfig) -> Result<(), ContractError> {
    if config.marks.loose_matching {
        check_positive("marks.loose_window_s", config.marks.loose_window_s)?;
    }
    Ok(())
}

fn validate_manual_offsets(config: &TimingConfig) -> Result<(), ContractError> {
    for (clock, offset) in &config.manual_offsets {
        if *clock == Clock::Isotime {
            return Err(ContractError::config_validation(
                "manual_offsets.isotime",
                "the reference axis cannot be calibrated",
            ));
        }
        if !offset.is_finite() {
            return Err(ContractError::config_validation(
                format!("manual_offsets.{clock}"),
                format!("offset must be finite, got {offset}"),
            ));
        }
    }
    Ok(())
}

fn check_positive(field: &str, value: f64) -> Result<(), ContractError> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(ContractError::config_validation(
            field,
            format!("must be > 0, got {value}"),
        ));
    }
    Ok(())
}
