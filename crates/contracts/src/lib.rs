//! # Contracts
//!
//! Shared data model for the timing pipeline: clocks, events, series, marks,
//! timing map anchors, configuration and the sink interface.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Timestamps are naive local wall-clock times (`chrono::NaiveDateTime`)
//! - Durations and offsets are seconds as `f64`
//! - `birch` is the usual reference clock; `isotime` is the reference axis itself

mod clock;
mod config;
mod error;
mod event;
pub mod isotime;
mod mark;
mod sequence;
mod series;
mod sink;
mod timing_map;

pub use clock::Clock;
pub use config::*;
pub use error::*;
pub use event::Event;
pub use mark::{ClockSample, Mark, MarkKind, MarkRecord};
pub use sequence::IdSequence;
pub use series::Series;
pub use sink::RecordSink;
pub use timing_map::{AnchorRecord, ClockOffset, TimingMapAnchor};
