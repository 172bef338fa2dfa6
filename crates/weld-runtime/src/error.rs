//! Runtime error types.
//!
//! Everything here is fatal at startup: configuration and wiring problems
//! abort before the application serves traffic. Per-event failures never
//! reach this module; they are handled inside the dispatch layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Failed to read the configuration file.
    #[error("failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    /// Configuration extraction failed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Validation {
        /// What is wrong.
        message: String,
    },

    /// The application was built without an event source.
    #[error("no event source configured; nothing would ever be dispatched")]
    EventSourceMissing,
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
