//! CLI argument definitions using clap.

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::{AnchorSelection, Clock, ConversionMode};
use std::path::PathBuf;

/// ReproNim timing - multi-clock session timing synchronization
#[derive(Parser, Debug)]
#[command(
    name = "repronim-timing",
    author,
    version,
    about = "Reconstruct a common time axis for independently clocked session recordings",
    long_about = "Reconstructs a common time axis for a recording session whose event streams \n\
                  were stamped by independent clocks.\n\n\
                  Detects series of periodic events per clock, matches them across clocks, \n\
                  emits synchronization marks and derives a timing map used to convert \n\
                  timestamps between clocks. Records go to stdout or files, logs to stderr."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        env = "REPRONIM_TIMING_VERBOSE"
    )]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "REPRONIM_TIMING_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Write Prometheus text metrics to this file when the command finishes
    #[arg(long, global = true, env = "REPRONIM_TIMING_METRICS_OUT")]
    pub metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate synchronization marks from the session's event dumps
    Marks(MarksArgs),

    /// Build the timing map from previously generated marks
    Tmap(TmapArgs),

    /// Generate marks and the timing map, writing both into the session
    Run(RunArgs),

    /// Convert one timestamp between clocks using a timing map
    Convert(ConvertArgs),

    /// Summarize a timing map
    Info(InfoArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),
}

/// Configuration file and overrides shared by the pipeline commands
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "REPRONIM_TIMING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the reference clock
    #[arg(long, env = "REPRONIM_TIMING_REFERENCE")]
    pub reference: Option<Clock>,

    /// Clocks whose timing-map values are synthesized rather than measured
    #[arg(long = "skip-clock", value_delimiter = ',', env = "REPRONIM_TIMING_SKIP_CLOCKS")]
    pub skip_clocks: Vec<Clock>,

    /// Tie unmatched clocks to their nearest event around each scan mark
    #[arg(long, env = "REPRONIM_TIMING_LOOSE_MATCHING")]
    pub loose: bool,

    /// Anchor selection policy
    #[arg(long, value_enum, env = "REPRONIM_TIMING_SELECTION")]
    pub selection: Option<SelectionArg>,

    /// Conversion mode between anchors
    #[arg(long, value_enum, env = "REPRONIM_TIMING_CONVERSION")]
    pub conversion: Option<ConversionArg>,

    /// Session time zone for offset-aware timestamps, e.g. `America/New_York`
    #[arg(long, env = "REPRONIM_TIMING_TIMEZONE")]
    pub timezone: Option<Tz>,
}

/// Session directory and study-range options
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session directory containing `timing-dumps/`
    #[arg(env = "REPRONIM_TIMING_SESSION")]
    pub session: PathBuf,

    /// Study range start (reference clock unless --range-clock is given)
    #[arg(long, requires = "range_end", conflicts_with = "study")]
    pub range_start: Option<String>,

    /// Study range end
    #[arg(long, requires = "range_start")]
    pub range_end: Option<String>,

    /// Clock the explicit study range is expressed in
    #[arg(long)]
    pub range_clock: Option<Clock>,

    /// Take the study range from the named StudyRecord in the dicoms dump
    #[arg(long, env = "REPRONIM_TIMING_STUDY")]
    pub study: Option<String>,

    /// Existing timing map used for conversions while generating marks
    #[arg(long)]
    pub tmap_in: Option<PathBuf>,
}

/// Arguments for the `marks` command
#[derive(Args, Debug)]
pub struct MarksArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Log mark summaries instead of writing records
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `tmap` command
#[derive(Args, Debug)]
pub struct TmapArgs {
    /// Session directory containing `timing-dumps/`
    #[arg(env = "REPRONIM_TIMING_SESSION", required_unless_present = "marks")]
    pub session: Option<PathBuf>,

    /// Marks file (defaults to the session's `dump_marks.jsonl`)
    #[arg(long)]
    pub marks: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Log anchor summaries instead of writing records
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `run` command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Marks output (defaults to the session's `dump_marks.jsonl`)
    #[arg(long)]
    pub marks_out: Option<String>,

    /// Timing map output (defaults to the session's `dump_tmap.jsonl`)
    #[arg(long)]
    pub tmap_out: Option<String>,

    /// Run every stage but only log record summaries
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `convert` command
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Timestamp to convert, e.g. `2024-06-04T13:54:19.385115`
    pub time: String,

    /// Clock the timestamp is expressed in
    #[arg(long)]
    pub from: Clock,

    /// Target clock
    #[arg(long)]
    pub to: Clock,

    /// Timing map file
    #[arg(long, env = "REPRONIM_TIMING_TMAP")]
    pub tmap: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Timing map file
    #[arg(long, env = "REPRONIM_TIMING_TMAP")]
    pub tmap: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show every anchor
    #[arg(long)]
    pub anchors: bool,

    /// Reference clock of the map (excluded from offset statistics)
    #[arg(long, default_value = "birch")]
    pub reference: Clock,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "timing.toml", env = "REPRONIM_TIMING_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the effective configuration with defaults filled in
    #[arg(long)]
    pub print: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

/// Anchor selection policy
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SelectionArg {
    /// Every configured clock present (or skip-set)
    Strict,
    /// Reference plus at least one other clock
    Extended,
}

impl From<SelectionArg> for AnchorSelection {
    fn from(arg: SelectionArg) -> Self {
        match arg {
            SelectionArg::Strict => AnchorSelection::Strict,
            SelectionArg::Extended => AnchorSelection::Extended,
        }
    }
}

/// Conversion mode
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ConversionArg {
    /// Offset of the governing anchor
    Hold,
    /// Linear interpolation between neighbouring anchors
    Interpolate,
}

impl From<ConversionArg> for ConversionMode {
    fn from(arg: ConversionArg) -> Self {
        match arg {
            ConversionArg::Hold => ConversionMode::Hold,
            ConversionArg::Interpolate => ConversionMode::Interpolate,
        }
    }
}
