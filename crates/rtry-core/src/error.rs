//! Error types for duration tokens and policy configuration.

use thiserror::Error;

/// A duration token could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Empty input, or input that is not `<number>[ms|s|m|h]`.
    #[error("invalid duration: {0:?}")]
    InvalidFormat(String),
}

/// A policy (or one of its parts) was configured with invalid values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Jitter takes either an absolute window or a percentage, never both.
    #[error("jitter window and jitter percent are mutually exclusive")]
    JitterWindowAndPercent,
    #[error("jitter percent must be between 0 and 100, got {0}")]
    JitterPercentOutOfRange(f64),
    #[error("invalid jitter mode {0:?}, expected \"full\" or \"pm\"")]
    JitterMode(String),
    #[error("hedge lane count must be >= 1, got {0}")]
    HedgeLanes(u32),
    #[error("unknown backoff mode {0:?}")]
    UnknownMode(String),
    #[error("sequence must contain at least one delay")]
    EmptySequence,
    #[error("no retry policy named {0:?} in config")]
    UnknownProfile(String),
    #[error(transparent)]
    Duration(#[from] DurationError),
}
