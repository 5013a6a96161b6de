//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::TimingConfig;
use serde::Serialize;
use tracing::info;

use super::clock_list;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    effective: Option<TimingConfig>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    reference_clock: String,
    clocks: String,
    skip_clocks: String,
    timezone: String,
    manual_offsets: usize,
    selection: String,
    conversion: String,
    loose_matching: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let (result, config) = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
        if let (true, Some(config)) = (args.print, config) {
            let toml = config_loader::ConfigLoader::to_toml(&config)
                .context("Failed to render configuration")?;
            println!("\n{}", toml);
        }
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> (ValidationResult, Option<TimingConfig>) {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return (
            ValidationResult {
                valid: false,
                config_path,
                error: Some(format!("File not found: {}", args.config.display())),
                warnings: None,
                summary: None,
                effective: None,
            },
            None,
        );
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let result = ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    reference_clock: config.reference_clock.to_string(),
                    clocks: clock_list(&config.clocks),
                    skip_clocks: clock_list(&config.skip_clocks),
                    timezone: config.timezone.name().to_string(),
                    manual_offsets: config.manual_offsets.len(),
                    selection: format!("{:?}", config.timing_map.selection),
                    conversion: format!("{:?}", config.conversion.mode),
                    loose_matching: config.marks.loose_matching,
                }),
                effective: (args.print && args.json).then(|| config.clone()),
            };
            (result, Some(config))
        }
        Err(e) => (
            ValidationResult {
                valid: false,
                config_path,
                error: Some(e.to_string()),
                warnings: None,
                summary: None,
                effective: None,
            },
            None,
        ),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &TimingConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.domains().next().is_none() {
        warnings.push(
            "Only the reference clock is configured - nothing to synchronize".to_string(),
        );
    }

    for clock in &config.skip_clocks {
        if !contracts::contains(&config.clocks, *clock) {
            warnings.push(format!("Skipped clock '{clock}' is not in the clock list"));
        }
    }

    for clock in config.manual_offsets.keys() {
        if !contracts::contains(&config.clocks, *clock) {
            warnings.push(format!("Manual offset for unconfigured clock '{clock}'"));
        }
    }

    if config.marks.loose_matching && !config.marks.chain_matches {
        warnings.push("Loose matching without chained matching may tie distant events".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Reference clock: {}", summary.reference_clock);
            println!("  Clocks: {}", summary.clocks);
            if !summary.skip_clocks.is_empty() {
                println!("  Skipped clocks: {}", summary.skip_clocks);
            }
            println!("  Time zone: {}", summary.timezone);
            println!("  Manual offsets: {}", summary.manual_offsets);
            println!("  Anchor selection: {}", summary.selection);
            println!("  Conversion: {}", summary.conversion);
            println!("  Loose matching: {}", summary.loose_matching);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
