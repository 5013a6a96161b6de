//! Error types for CLI operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Session directory without a `timing-dumps/` directory
    #[error("Session directory not found or has no timing dumps: {}", path.display())]
    SessionNotFound { path: PathBuf },

    /// Invalid command-line value
    #[error("Invalid value for {name}: {message}")]
    InvalidArgument { name: String, message: String },

    /// Pipeline execution error
    #[error("Pipeline stage '{stage}' failed: {message}")]
    PipelineExecution { stage: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn session_not_found(path: &Path) -> Self {
        Self::SessionNotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn pipeline_execution(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
