//! Layered error definitions
//!
//! Categorized by source: config / data / record / io

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Unknown clock name
    #[error("unknown clock: '{0}'")]
    UnknownClock(String),

    // ===== Data Errors =====
    /// A required upstream series, stream or artifact is absent or empty
    #[error("missing data: {resource}: {message}")]
    MissingData { resource: String, message: String },

    /// Required input file does not exist
    #[error("missing input file: {}", path.display())]
    MissingFile { path: PathBuf },

    /// A single input record could not be parsed
    #[error("malformed record at {source_name}:{line}: {message}")]
    MalformedRecord {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Timestamp could not be parsed
    #[error("invalid isotime '{value}': {message}")]
    InvalidIsotime { value: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create missing data error
    pub fn missing_data(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingData {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create malformed record error
    pub fn malformed_record(
        source_name: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedRecord {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
