//! Retry loop: run an operation until it succeeds, the decider declines, or time runs out.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::clock::{remaining_ms, Clock, Sleeper, SystemClock, ThreadSleeper};
use super::context::AttemptContext;
use super::error::{DeadlineReached, RetryError};
use super::outcome::AttemptOutcome;
use crate::classify::{Context, Failure, FailureMetadata, Headers};
use crate::hedge::{self, Lane};
use crate::policy::Policy;

/// Called after a failed attempt that will be retried, before sleeping.
/// Receives the planned sleep in milliseconds and the classifier's echoed headers.
pub type BetweenAttemptsHook = Box<
    dyn Fn(&AttemptContext, &AttemptOutcome<'_>, &Policy, u64, &Headers) -> anyhow::Result<()>
        + Send
        + Sync,
>;

/// Called exactly once when a run ends in failure.
pub type GiveUpHook = Box<
    dyn Fn(&AttemptContext, &AttemptOutcome<'_>, &Policy, &Headers) -> anyhow::Result<()>
        + Send
        + Sync,
>;

/// Drives attempts under a [`Policy`]. Holds the clock, the sleeper and the hooks;
/// one engine can run many policies.
pub struct Engine {
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    between_attempts: Option<BetweenAttemptsHook>,
    on_give_up: Option<GiveUpHook>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(ThreadSleeper))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("between_attempts", &self.between_attempts.is_some())
            .field("on_give_up", &self.on_give_up.is_some())
            .finish_non_exhaustive()
    }
}

/// Classification of the most recent failure, kept for the give-up paths.
#[derive(Default)]
struct LastFailure {
    status_code: Option<u16>,
    tags: Vec<String>,
    headers: Headers,
}

impl Engine {
    pub fn new(clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            clock,
            sleeper,
            between_attempts: None,
            on_give_up: None,
        }
    }

    pub fn on_between_attempts<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AttemptContext, &AttemptOutcome<'_>, &Policy, u64, &Headers) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.between_attempts = Some(Box::new(hook));
        self
    }

    pub fn on_give_up<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AttemptContext, &AttemptOutcome<'_>, &Policy, &Headers) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.on_give_up = Some(Box::new(hook));
        self
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// Attempts run one at a time on the calling thread. On failure the
    /// operation's own error comes back as [`RetryError::Operation`].
    pub fn run<T, E, F>(&self, policy: &Policy, context: Context, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Failure,
        F: FnMut(&AttemptContext) -> Result<T, E>,
    {
        self.drive(policy, context, |ctx| hedge::primary(|_| op(ctx)))
    }

    /// Like [`Engine::run`], but each attempt is raced across the policy's
    /// hedge lanes when it has a hedge spec.
    ///
    /// Lanes run on detached threads, so the operation and its results must
    /// be `'static`. A losing lane may still be running when this returns.
    pub fn run_hedged<T, E, F>(&self, policy: &Policy, context: Context, op: F) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        E: Failure,
        F: Fn(&AttemptContext, &Lane<'_>) -> Result<T, E> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        self.drive(policy, context, |ctx| match policy.hedge() {
            Some(spec) => {
                let op = Arc::clone(&op);
                let ctx = ctx.clone();
                hedge::race(spec, Arc::clone(&self.sleeper), move |lane| op(&ctx, lane))
            }
            None => hedge::primary(|lane| op(ctx, lane)),
        })
    }

    fn drive<T, E, F>(&self, policy: &Policy, mut context: Context, mut attempt_once: F) -> Result<T, RetryError<E>>
    where
        E: Failure,
        F: FnMut(&AttemptContext) -> Result<T, E>,
    {
        let max_attempts = policy.attempts().max(1);
        let first = self.clock.now();
        let deadline = policy
            .deadline_budget_ms()
            .map(|ms| first + Duration::from_millis(ms));

        let start_after = policy.start_after_ms();
        tracing::debug!(
            attempts = max_attempts,
            start_after_ms = start_after,
            attempt_timeout_ms = ?policy.attempt_timeout_ms(),
            deadline_budget_ms = ?policy.deadline_budget_ms(),
            context_keys = ?context.keys().collect::<Vec<_>>(),
            "retry.start"
        );

        if start_after > 0 {
            if let Some(deadline) = deadline {
                if !self.has_time_left(deadline, start_after) {
                    return Err(RetryError::StartAfterExceedsDeadline {
                        delay_ms: start_after,
                    });
                }
            }
            tracing::debug!(delay_ms = start_after, "retry.sleep.before_first");
            self.sleeper.sleep_ms(start_after);
        }

        let mut last_error: Option<E> = None;
        let mut last = LastFailure::default();
        let mut scheduled_delay = start_after;

        for attempt in 1..=max_attempts {
            let mut ctx = self.attempt_context(
                attempt,
                max_attempts,
                scheduled_delay,
                first,
                deadline,
                &context,
            );

            if let Some(deadline) = deadline {
                if remaining_ms(deadline, self.clock.now()) == 0 {
                    ctx.set_remaining_budget_ms(Some(0));
                    return Err(match last_error {
                        Some(e) => {
                            let outcome = AttemptOutcome::failure(&e, last.status_code, &last.tags);
                            self.give_up(&ctx, &outcome, policy, &last.headers);
                            RetryError::Operation(e)
                        }
                        None => {
                            let outcome = AttemptOutcome::failure(&DeadlineReached, None, &[]);
                            self.give_up(&ctx, &outcome, policy, &last.headers);
                            RetryError::DeadlineExceeded
                        }
                    });
                }
            }

            let err = match attempt_once(&ctx) {
                Ok(value) => {
                    tracing::info!(
                        attempt,
                        total_elapsed_ms = ctx.elapsed_since_first_ms(),
                        "retry.success"
                    );
                    return Ok(value);
                }
                Err(e) => e,
            };

            let meta = match policy.classifier() {
                Some(classifier) => {
                    let meta = classifier.classify(&err);
                    context.extend(meta.context_patch.clone());
                    tracing::warn!(
                        attempt,
                        error = %err,
                        code = ?err.code(),
                        status_code = ?meta.status_code,
                        tags = ?meta.tags,
                        min_next_delay_ms = ?meta.min_next_delay_ms,
                        not_before_unix_ms = ?meta.not_before_unix_ms,
                        header_hints_present = !meta.headers.is_empty(),
                        "retry.failure.classified"
                    );
                    meta
                }
                None => {
                    tracing::warn!(attempt, error = %err, code = ?err.code(), "retry.failure.unclassified");
                    FailureMetadata::default()
                }
            };

            let outcome = AttemptOutcome::failure(&err, meta.status_code, &meta.tags);
            let should_retry = policy.decider().should_retry(&outcome, &ctx);
            tracing::debug!(
                attempt,
                should_retry,
                status_code = ?meta.status_code,
                tags = ?meta.tags,
                "retry.decision"
            );

            if !should_retry || attempt == max_attempts {
                self.give_up(&ctx, &outcome, policy, &meta.headers);
                return Err(RetryError::Operation(err));
            }

            let sleep_ms = self.next_sleep_ms(policy, attempt, &meta);
            if let Some(deadline) = deadline {
                if !self.has_time_left(deadline, sleep_ms) {
                    self.give_up(&ctx, &outcome, policy, &meta.headers);
                    return Err(RetryError::Operation(err));
                }
            }

            if let Some(hook) = &self.between_attempts {
                contain_hook("between_attempts", || {
                    hook(&ctx, &outcome, policy, sleep_ms, &meta.headers)
                });
            }
            self.sleeper.sleep_ms(sleep_ms);
            scheduled_delay = sleep_ms;

            last = LastFailure {
                status_code: meta.status_code,
                tags: meta.tags,
                headers: meta.headers,
            };
            last_error = Some(err);
        }

        // Unreachable while the last attempt always gives up above; kept so
        // a loop that ends without a decision still reports and runs the hook.
        let mut ctx = self.attempt_context(
            max_attempts,
            max_attempts,
            scheduled_delay,
            first,
            None,
            &context,
        );
        ctx.set_remaining_budget_ms(Some(0));
        match &last_error {
            Some(e) => {
                let outcome = AttemptOutcome::failure(e, last.status_code, &last.tags);
                self.give_up(&ctx, &outcome, policy, &last.headers);
            }
            None => {
                let outcome = AttemptOutcome::failure(&DeadlineReached, None, &[]);
                self.give_up(&ctx, &outcome, policy, &last.headers);
            }
        }
        Err(RetryError::Exhausted { last: last_error })
    }

    /// Nominal delay for the next attempt, raised to the classifier's floor
    /// and not-before instant when the policy follows headers.
    fn next_sleep_ms(&self, policy: &Policy, attempt: u32, meta: &FailureMetadata) -> u64 {
        let mut sleep_ms = policy.next_delay_ms(Some(attempt + 1));
        if !policy.follow_headers() {
            return sleep_ms;
        }
        if let Some(min) = meta.min_next_delay_ms {
            sleep_ms = sleep_ms.max(min);
        }
        if let Some(not_before) = meta.not_before_unix_ms {
            let delta = not_before.saturating_sub(self.clock.now_unix_ms());
            if delta > 0 {
                sleep_ms = sleep_ms.max(delta as u64);
            }
        }
        sleep_ms
    }

    fn attempt_context(
        &self,
        attempt: u32,
        max_attempts: u32,
        scheduled_delay_ms: u64,
        first: SystemTime,
        deadline: Option<SystemTime>,
        context: &Context,
    ) -> AttemptContext {
        let now = self.clock.now();
        let elapsed_ms = now
            .duration_since(first)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let remaining = deadline.map(|d| remaining_ms(d, now));
        tracing::info!(
            attempt,
            max_attempts,
            scheduled_delay_ms,
            elapsed_ms,
            remaining_budget_ms = ?remaining,
            "retry.attempt"
        );
        AttemptContext::new(
            attempt,
            max_attempts,
            scheduled_delay_ms,
            elapsed_ms,
            remaining,
            context.clone(),
        )
    }

    /// Strict: the budget must outlast the sleep.
    fn has_time_left(&self, deadline: SystemTime, sleep_ms: u64) -> bool {
        remaining_ms(deadline, self.clock.now()) > sleep_ms
    }

    fn give_up(&self, ctx: &AttemptContext, outcome: &AttemptOutcome<'_>, policy: &Policy, headers: &Headers) {
        tracing::error!(
            attempt = ctx.attempt_number(),
            max_attempts = ctx.max_attempts(),
            total_elapsed_ms = ctx.elapsed_since_first_ms(),
            last_error = %outcome.error().map(|e| e.to_string()).unwrap_or_default(),
            status_code = ?outcome.status_code(),
            tags = ?outcome.tags(),
            "retry.give_up"
        );
        if let Some(hook) = &self.on_give_up {
            contain_hook("give_up", || hook(ctx, outcome, policy, headers));
        }
    }
}

/// Hook errors and panics are logged and dropped; they never reach the caller.
fn contain_hook(name: &str, f: impl FnOnce() -> anyhow::Result<()>) {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(hook = name, error = %e, "retry hook failed"),
        Err(_) => tracing::warn!(hook = name, "retry hook panicked"),
    }
}
