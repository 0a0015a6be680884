// src/error.rs - Error types shared by the simulator and the tuner
use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TunerError>;

#[derive(Debug, Error)]
pub enum TunerError {
    /// A parameter set, grid or search configuration breaks a structural rule.
    /// Raised before any run starts and never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TunerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TunerError::InvalidConfiguration(msg.into())
    }
}
