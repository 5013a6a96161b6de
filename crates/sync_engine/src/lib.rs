//! # Sync Engine
//!
//! Cross-clock timing reconstruction.
//!
//! Responsible for:
//! - Segmenting event streams into series
//! - Matching series across clock domains
//! - Generating start/scan/end marks
//! - Building the timing map from marks
//! - Converting timestamps between clocks (`TimingMapService`)
//!
//! ## Usage
//!
//! ```ignore
//! use contracts::{Clock, IdSequence, TimingConfig};
//! use sync_engine::{DomainInputs, MarkGenerator, Segmenter, TimingMapBuilder, TimingMapService};
//!
//! let config = TimingConfig::default();
//! let bootstrap = TimingMapService::from_config(Vec::new(), &config);
//!
//! let mut inputs = DomainInputs::default();
//! for (clock, events) in streams {
//!     let (series, _) = Segmenter::new(&config.segmenter, &bootstrap).segment(clock, &events);
//!     inputs.series.insert(clock, series);
//! }
//!
//! let mut ids = IdSequence::new();
//! let (marks, _) = MarkGenerator::new(&config, &bootstrap).generate(&inputs, &mut ids)?;
//! let (anchors, _) = TimingMapBuilder::new(&config).build(&marks)?;
//!
//! let service = TimingMapService::from_config(anchors, &config);
//! let dicoms_time = service.convert(Clock::Birch, Clock::Dicoms, Some(birch_time));
//! ```

mod builder;
mod marks;
mod matcher;
mod segmenter;
mod service;

pub use builder::{deviation, BuildStats, TimingMapBuilder};
pub use marks::{nearest_within, DomainInputs, MarkGenerator, MarkStats, MARK_ID_PREFIX};
pub use matcher::{Matcher, Rejection, SeriesMatch};
pub use segmenter::{SegmentStats, Segmenter};
pub use service::{is_ascending, TimingMapService};
