//! # Dispatcher
//!
//! Record output.
//!
//! Responsible for:
//! - Serializing marks and timing map anchors once per record
//! - Fan-out to one or more sinks (JSONL file, stdout, log)
//! - Isolating a failing sink so the others still receive every record

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod sinks;

pub use contracts::RecordSink;
pub use dispatcher::{create_dispatcher, create_sink, Dispatcher, SinkTarget};
pub use error::DispatcherError;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, JsonlSink, LogSink, StdoutSink};
