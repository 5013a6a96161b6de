//! JsonlSink - writes one JSON object per line

use contracts::{ContractError, RecordSink};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Line-delimited JSON sink over any writer
pub struct JsonlSink<W: Write> {
    name: String,
    writer: BufWriter<W>,
    path: Option<PathBuf>,
    lines: u64,
}

/// JSONL file output
pub type FileSink = JsonlSink<File>;

/// JSONL on standard output
pub type StdoutSink = JsonlSink<Stdout>;

impl<W: Write> JsonlSink<W> {
    /// Wrap an arbitrary writer
    pub fn from_writer(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: BufWriter::new(writer),
            path: None,
            lines: 0,
        }
    }

    /// Lines written so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Output path, for file sinks
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, ContractError> {
        let name = self.name;
        self.writer
            .into_inner()
            .map_err(|e| ContractError::sink_write(name, e.error().to_string()))
    }

    fn write_line(&mut self, record: &Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(b"\n")
    }
}

impl FileSink {
    /// Create (or truncate) `path`, creating parent directories as needed
    pub fn create(name: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut sink = Self::from_writer(name, file);
        sink.path = Some(path.to_path_buf());
        Ok(sink)
    }
}

impl StdoutSink {
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::from_writer(name, io::stdout())
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, record: &Value) -> Result<(), ContractError> {
        self.write_line(record).map_err(|e| {
            error!(sink = %self.name, line = self.lines + 1, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })?;
        self.lines += 1;
        Ok(())
    }

    #[instrument(name = "jsonl_sink_flush", skip(self), fields(sink = %self.name))]
    fn flush(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "jsonl_sink_close", skip(self), fields(sink = %self.name))]
    fn close(&mut self) -> Result<(), ContractError> {
        self.flush()?;
        debug!(
            sink = %self.name,
            lines = self.lines,
            path = ?self.path.as_ref().map(|p| p.display().to_string()),
            "JsonlSink closed"
        );
        Ok(())
    }
}
