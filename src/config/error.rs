//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Grid dimensions must be non-zero")]
    EmptyGrid,

    #[error("BPM range is inverted or zero")]
    InvalidBpmRange,

    #[error("Default BPM outside configured range")]
    DefaultBpmOutOfRange,

    #[error("Subdivisions per beat must be non-zero")]
    InvalidSubdivisions,
}
