//! Error handling for the IP camera detection pipeline
//!
//! Assembly-time failures (configuration, resources, stage creation, linking)
//! are returned synchronously. Failures reported on the pipeline bus while
//! playing are logged and end the run loop instead of being returned.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the hailocam pipeline
#[derive(Error, Debug)]
pub enum HailoCamError {
    // Model selection errors
    #[error("Model {model} not found for {hardware}. Available models: {}", .available.join(", "))]
    Configuration {
        model: String,
        hardware: String,
        available: Vec<String>,
    },

    #[error("HEF file not found at {0}")]
    ResourceNotFound(PathBuf),

    // GStreamer graph errors
    #[error("Could not create {stage} element ({factory}): {reason}")]
    StageCreation {
        stage: String,
        factory: String,
        reason: String,
    },

    #[error("Could not set property {key} on {stage}: {reason}")]
    Property {
        stage: String,
        key: String,
        reason: String,
    },

    #[error("Failed to link elements {upstream} -> {downstream}: {reason}")]
    Link {
        upstream: String,
        downstream: String,
        reason: String,
    },

    #[error("Media runtime initialisation failed: {0}")]
    RuntimeInit(String),

    #[error("State transition failed: {0}")]
    StateTransition(String),

    #[error("Pipeline error: {message} ({})", .debug.as_deref().unwrap_or("no debug info"))]
    RuntimeObserved {
        message: String,
        debug: Option<String>,
    },

    // Configuration file errors
    #[error("Configuration parsing failed: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidConfigValue { field: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type HailoCamResult<T> = std::result::Result<T, HailoCamError>;

impl From<crate::config::ConfigError> for HailoCamError {
    fn from(err: crate::config::ConfigError) -> Self {
        match err {
            crate::config::ConfigError::InvalidValue { field, value } => {
                HailoCamError::InvalidConfigValue { field, value }
            }
            other => HailoCamError::ConfigParse(other.to_string()),
        }
    }
}
