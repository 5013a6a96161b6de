//! LogSink - logs record summaries via tracing (dry runs)

use contracts::{ContractError, RecordSink};
use serde_json::Value;
use tracing::info;

/// Sink that logs a one-line summary per record instead of persisting it
pub struct LogSink {
    name: String,
    records: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: 0,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    fn summary(record: &Value) -> String {
        let field = |key: &str| record.get(key).and_then(Value::as_str);
        match (field("id").or(field("mark_id")), field("name").or(field("mark_name"))) {
            (Some(id), Some(name)) => format!("{id} ({name})"),
            (Some(id), None) => id.to_string(),
            _ => field("isotime").unwrap_or("<record>").to_string(),
        }
    }
}

impl RecordSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, record: &Value) -> Result<(), ContractError> {
        self.records += 1;
        info!(sink = %self.name, record = %Self::summary(record), "record");
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, records = self.records, "LogSink closed");
        Ok(())
    }
}
