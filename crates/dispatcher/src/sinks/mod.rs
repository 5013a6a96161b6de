//! Sink implementations
//!
//! Contains JsonlSink (file or stdout) and LogSink.

mod file;
mod log;

pub use self::file::{FileSink, JsonlSink, StdoutSink};
pub use self::log::LogSink;
