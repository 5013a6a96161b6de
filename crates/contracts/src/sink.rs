//! RecordSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for record outputs (marks, timing map).

use serde_json::Value;

use crate::ContractError;

/// Record output trait
///
/// All sink implementations must implement this trait.
pub trait RecordSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one serialized record as a single line
    ///
    /// # Errors
    /// Returns write error (should include context)
    fn write(&mut self, record: &Value) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    fn close(&mut self) -> Result<(), ContractError>;
}
