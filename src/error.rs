// Error types for the kernel density source engine

use thiserror::Error;

/// Every failure the engine reports to its driver.
///
/// Fit-time errors abort the `fit` call without producing a model. Sampling
/// errors surface only after the local retry budget is spent.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed geometry, variable or run setup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Too few (or degenerate) samples for the requested operation
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Non-positive or non-finite bandwidth, requested or computed
    #[error("invalid bandwidth: {0}")]
    InvalidBandwidth(String),

    /// A loaded descriptor disagrees with itself or with its training data
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// Perturbation kept producing non-physical particles
    #[error("resampling error: {0}")]
    Resampling(String),

    /// I/O error from the track or descriptor collaborators
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
