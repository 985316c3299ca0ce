//! Error types for the dimension engine

use thiserror::Error;

/// Result type alias using DimensionError
pub type DimensionResult<T> = Result<T, DimensionError>;

/// Errors raised while resolving domains, querying time distributions or
/// decoding snapshots
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DimensionError {
    #[error("Domain request failed: {0}")]
    DomainRequest(String),

    #[error("Request canceled")]
    Canceled,

    #[error("Time distribution lookup failed: {0}")]
    TimeDistribution(String),

    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    #[error("Invalid snapshot entry for '{dimension}': {message}")]
    InvalidSnapshot { dimension: String, message: String },
}

impl DimensionError {
    /// Whether this error comes from a superseded or disposed request
    pub fn is_canceled(&self) -> bool {
        matches!(self, DimensionError::Canceled)
    }
}
