//! Error handling utilities shared across the crate.

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = MetricError> = std::result::Result<T, E>;

/// Errors raised while building metrics or feeding them segments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricError {
    /// Metric configuration or reference data failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// More hypotheses were supplied than there are reference sets.
    #[error("attempt to add more candidates, {attempted}, than references, {available}")]
    TooManyCandidates {
        /// One-based number of the candidate that overran the references.
        attempted: usize,
        /// Number of reference sets the metric was built from.
        available: usize,
    },
    /// A batch operation received no input.
    #[error("empty input: {0}")]
    EmptyInput(String),
    /// Internal state disagreed with itself, indicating a sequencing bug in the caller.
    #[error("internal consistency failure: {0}")]
    Inconsistent(String),
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MetricError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl MetricError {
    /// Helper constructor for overrun errors at zero-based `position`.
    #[must_use]
    pub fn too_many_candidates(position: usize, available: usize) -> Self {
        Self::TooManyCandidates {
            attempted: position + 1,
            available,
        }
    }
}
