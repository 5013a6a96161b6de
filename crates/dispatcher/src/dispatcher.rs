//! Dispatcher - fan-out of records to sinks

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use contracts::{ContractError, RecordSink};

use crate::error::DispatcherError;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{FileSink, LogSink, StdoutSink};

/// Where records go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// JSONL file, truncated on open
    File(PathBuf),
    /// JSONL on stdout
    Stdout,
    /// Summary log lines only
    Log,
}

impl SinkTarget {
    /// `-` means stdout, anything else is a file path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            SinkTarget::Stdout
        } else {
            SinkTarget::File(PathBuf::from(arg))
        }
    }
}

/// Create a sink from its target
#[instrument(name = "dispatcher_create_sink", skip(name), fields(sink = %name))]
pub fn create_sink(
    name: &str,
    target: &SinkTarget,
) -> Result<Box<dyn RecordSink>, DispatcherError> {
    match target {
        SinkTarget::File(path) => {
            let sink = FileSink::create(name, path).map_err(|e| {
                DispatcherError::sink_creation(name, format!("{}: {e}", path.display()))
            })?;
            Ok(Box::new(sink))
        }
        SinkTarget::Stdout => Ok(Box::new(StdoutSink::stdout(name))),
        SinkTarget::Log => Ok(Box::new(LogSink::new(name))),
    }
}

struct SinkSlot {
    sink: Box<dyn RecordSink>,
    metrics: SinkMetrics,
}

/// Fans out records to every sink; a failing sink is isolated and reported
/// at [`Dispatcher::finish`]
#[derive(Default)]
pub struct Dispatcher {
    slots: Vec<SinkSlot>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    pub fn with_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.slots.push(SinkSlot {
            sink,
            metrics: SinkMetrics::new(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.slots
            .iter()
            .map(|s| (s.sink.name().to_string(), s.metrics.snapshot()))
            .collect()
    }

    /// Serialize each record once and offer it to every healthy sink.
    ///
    /// Returns the number of records dispatched.
    ///
    /// # Errors
    /// Serialization failure of a record (sink failures are deferred).
    #[instrument(
        name = "dispatcher_dispatch",
        skip_all,
        fields(records = records.len(), sinks = self.slots.len())
    )]
    pub fn dispatch<T: Serialize>(&mut self, records: &[T]) -> Result<usize, DispatcherError> {
        for record in records {
            let value = serde_json::to_value(record).map_err(ContractError::from)?;
            for slot in &mut self.slots {
                if slot.metrics.has_failed() {
                    slot.metrics.record_skip();
                    continue;
                }
                match slot.sink.write(&value) {
                    Ok(()) => slot.metrics.record_write(slot.sink.name()),
                    Err(e) => {
                        error!(
                            sink = %slot.sink.name(),
                            error = %e,
                            "Sink write failed, isolating sink"
                        );
                        slot.metrics.record_failure(slot.sink.name(), e.to_string());
                    }
                }
            }
        }
        debug!(records = records.len(), "Dispatched records");
        Ok(records.len())
    }

    /// Flush and close every sink.
    ///
    /// # Errors
    /// The first sink that failed a write, flush or close.
    #[instrument(name = "dispatcher_finish", skip(self))]
    pub fn finish(mut self) -> Result<Vec<(String, MetricsSnapshot)>, DispatcherError> {
        let mut first_error: Option<DispatcherError> = None;

        for slot in &mut self.slots {
            let name = slot.sink.name().to_string();
            let closed = slot.sink.flush().and_then(|()| slot.sink.close());
            if let Err(e) = closed {
                warn!(sink = %name, error = %e, "Sink close failed");
                slot.metrics.record_failure(&name, e.to_string());
            }
            if slot.metrics.has_failed() && first_error.is_none() {
                first_error = Some(DispatcherError::SinkFailed {
                    written: slot.metrics.write_count(),
                    message: slot.metrics.first_failure().unwrap_or("unknown failure").to_string(),
                    name,
                });
            }
        }

        let metrics = self.metrics();
        info!(sinks = metrics.len(), "Dispatcher shutdown complete");
        match first_error {
            Some(e) => Err(e),
            None => Ok(metrics),
        }
    }
}

/// Convenience function to create a dispatcher from targets
#[instrument(name = "dispatcher_create", skip_all, fields(name = %name, targets = targets.len()))]
pub fn create_dispatcher(
    name: &str,
    targets: &[SinkTarget],
) -> Result<Dispatcher, DispatcherError> {
    let mut dispatcher = Dispatcher::new();
    for target in targets {
        dispatcher = dispatcher.with_sink(create_sink(name, target)?);
    }
    Ok(dispatcher)
}
