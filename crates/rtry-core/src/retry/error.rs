use thiserror::Error;

use crate::classify::Failure;

/// Why [`super::Engine::run`] stopped without a result.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation's own error from the final attempt, unchanged.
    #[error(transparent)]
    Operation(E),
    /// The configured start-after delay alone would overrun the deadline budget.
    #[error("start-after delay of {delay_ms}ms exceeds the deadline budget")]
    StartAfterExceedsDeadline { delay_ms: u64 },
    /// The deadline passed before any attempt failed.
    #[error("retry deadline exceeded")]
    DeadlineExceeded,
    /// The attempt loop ran out without a terminal decision.
    #[error("retry attempts exhausted")]
    Exhausted { last: Option<E> },
}

impl<E> RetryError<E> {
    /// The operation error, if this failure carries one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Exhausted { last } => last,
            RetryError::StartAfterExceedsDeadline { .. } | RetryError::DeadlineExceeded => None,
        }
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            RetryError::Operation(e) => Some(e),
            RetryError::Exhausted { last } => last.as_ref(),
            RetryError::StartAfterExceedsDeadline { .. } | RetryError::DeadlineExceeded => None,
        }
    }
}

/// Stand-in failure handed to the give-up hook when the deadline passes
/// before any attempt has failed.
#[derive(Debug, Clone, Copy, Error)]
#[error("retry deadline exceeded")]
pub struct DeadlineReached;

impl Failure for DeadlineReached {}
