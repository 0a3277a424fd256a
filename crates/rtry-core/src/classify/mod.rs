//! Failure classification: turn an operation's error into structured retry hints.

mod classifier;
mod failure;
mod metadata;
pub mod rules;
pub mod tokens;

pub use classifier::Classifier;
pub use failure::{Accessor, AsDynError, DbErrorInfo, Failure, HttpResponse, OperationError};
pub use metadata::{Context, FailureMetadata, Headers};
pub use rules::{InstanceOf, MessageRegex, MethodStatus, RateLimitBackoff, Rule};
