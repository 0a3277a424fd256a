use crate::classify::Context;

/// What an attempt knows about where it sits in the retry sequence.
///
/// Built fresh by the engine for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptContext {
    attempt_number: u32,
    max_attempts: u32,
    scheduled_delay_ms: u64,
    elapsed_since_first_ms: u64,
    remaining_budget_ms: Option<u64>,
    context: Context,
}

impl AttemptContext {
    pub fn new(
        attempt_number: u32,
        max_attempts: u32,
        scheduled_delay_ms: u64,
        elapsed_since_first_ms: u64,
        remaining_budget_ms: Option<u64>,
        context: Context,
    ) -> Self {
        Self {
            attempt_number,
            max_attempts,
            scheduled_delay_ms,
            elapsed_since_first_ms,
            remaining_budget_ms,
            context,
        }
    }

    /// 1-based.
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt_number >= self.max_attempts
    }

    /// The delay slept before this attempt (0 for the first).
    pub fn scheduled_delay_ms(&self) -> u64 {
        self.scheduled_delay_ms
    }

    pub fn elapsed_since_first_ms(&self) -> u64 {
        self.elapsed_since_first_ms
    }

    /// `None` when the policy has no deadline budget.
    pub fn remaining_budget_ms(&self) -> Option<u64> {
        self.remaining_budget_ms
    }

    pub fn set_remaining_budget_ms(&mut self, ms: Option<u64>) {
        self.remaining_budget_ms = ms;
    }

    /// Caller context, extended by classifier patches from earlier attempts.
    pub fn context(&self) -> &Context {
        &self.context
    }
}
