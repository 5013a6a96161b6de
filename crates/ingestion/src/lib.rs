//! # Ingestion
//!
//! Session input loading.
//!
//! Responsibilities:
//! - Read line-delimited JSON, skipping blank/comment lines and logging
//!   malformed ones
//! - Load per-clock event streams ordered by isotime
//! - Filter events to a study range
//! - Resolve session paths and load derived artifacts (marks, timing map)
//!
//! ## Usage Example
//!
//! ```no_run
//! use contracts::{Clock, TimingConfig};
//! use ingestion::{load_events, SessionLayout};
//!
//! let config = TimingConfig::default();
//! let layout = SessionLayout::open("/data/ses-20240604").unwrap();
//! let path = layout.events_path(Clock::Birch);
//! let (stream, stats) = load_events(&path, Clock::Birch, config.timezone).unwrap();
//! println!("{} events, {} malformed", stream.len(), stats.malformed);
//! ```

mod artifacts;
mod events;
mod layout;
mod range;
mod reader;

// Re-exports
pub use artifacts::{load_marks, load_timing_map};
pub use events::{load_events, EventStream, SUMMARY_RECORD_TYPES};
pub use layout::{SessionLayout, DUMPS_DIR, MARKS_FILE, TMAP_FILE};
pub use range::{find_study_range, StudyRange};
pub use reader::{read_jsonl, read_records, JsonLine, ReadStats};
