pub mod config;
pub mod logging;

pub mod classify;
pub mod duration;
pub mod error;
pub mod hedge;
pub mod jitter;
pub mod policy;
pub mod retry;
pub mod sequence;

pub use classify::{Classifier, Failure, FailureMetadata, HttpResponse, OperationError};
pub use config::RtryConfig;
pub use error::{ConfigError, DurationError};
pub use hedge::{HedgeSpec, Lane};
pub use jitter::{Jitter, JitterMode};
pub use policy::{BackoffMode, Policy};
pub use retry::{AttemptContext, AttemptOutcome, Engine, RetryError};
pub use sequence::Sequence;
