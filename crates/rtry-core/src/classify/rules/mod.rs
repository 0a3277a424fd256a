//! Classification rules. Each inspects one failure and may emit metadata fragments.

mod instance_of;
mod message_regex;
mod method_status;
mod rate_limit;

pub use instance_of::InstanceOf;
pub use message_regex::MessageRegex;
pub use method_status::MethodStatus;
pub use rate_limit::RateLimitBackoff;

use std::any::Any;
use std::fmt;

use super::failure::Failure;
use super::metadata::FailureMetadata;

/// One classification rule. An empty result means the rule declined.
pub trait Rule: AsAnyRule + fmt::Debug + Send + Sync {
    fn apply(&self, err: &dyn Failure) -> Vec<FailureMetadata>;
}

/// Lets the classifier ask "is there already a rule of type R?".
pub trait AsAnyRule {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Rule + 'static> AsAnyRule for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
