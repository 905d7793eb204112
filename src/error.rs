//! Error types for learner construction and reconfiguration.
//!
//! Only configuration-level problems are surfaced as errors. Recoverable
//! training conditions (depth limit, insufficient data, no positive gain)
//! are encoded as invalid split candidates so the growth loop routes
//! around them.

use thiserror::Error;

/// Fatal errors raised by the learner's setup paths.
#[derive(Debug, Error)]
pub enum Error {
    /// A replacement dataset must keep the feature count of the dataset
    /// the learner was built against.
    #[error("dataset feature count changed: expected {expected}, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },

    /// A configuration field is out of its legal range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
