//! Retry policy: attempt budget, timing, backoff shape, and the decider/classifier pair.

mod decider;

pub use decider::{AlwaysRetry, AnyOf, OnTokens, RetryDecider, Token};

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::classify::Classifier;
use crate::error::ConfigError;
use crate::hedge::HedgeSpec;
use crate::jitter::Jitter;
use crate::sequence::Sequence;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

/// How the nominal delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    /// `max(1, attempt - 1) * delay`.
    Linear,
    /// `start_after * base^(attempt - 2)`.
    #[default]
    Exponential,
    /// Explicit per-attempt delays.
    Sequence,
}

impl BackoffMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BackoffMode::Linear => "linear",
            BackoffMode::Exponential => "exponential",
            BackoffMode::Sequence => "sequence",
        }
    }
}

impl fmt::Display for BackoffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackoffMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "lin" => Ok(BackoffMode::Linear),
            "exponential" | "exp" => Ok(BackoffMode::Exponential),
            "sequence" | "seq" => Ok(BackoffMode::Sequence),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

/// Full configuration of one retry strategy.
///
/// Reusable across many engine runs. The only mutable state is the cursor
/// behind [`Policy::next_delay_ms`]`(None)`; call [`Policy::reset_cursor`]
/// between independent sequences that use that path.
#[derive(Debug)]
pub struct Policy {
    attempts: u32,
    attempt_timeout_ms: Option<u64>,
    deadline_budget_ms: Option<u64>,
    start_after_ms: u64,
    mode: BackoffMode,
    exponential_base: f64,
    delay_ms: Option<u64>,
    follow_headers: bool,
    cap_ms: Option<u64>,
    sequence: Option<Sequence>,
    hedge: Option<HedgeSpec>,
    jitter: Option<Jitter>,
    decider: Box<dyn RetryDecider>,
    classifier: Option<Classifier>,
    seed: Option<u64>,
    cursor: AtomicU32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            attempt_timeout_ms: None,
            deadline_budget_ms: None,
            start_after_ms: 0,
            mode: BackoffMode::default(),
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            delay_ms: None,
            follow_headers: true,
            cap_ms: None,
            sequence: None,
            hedge: None,
            jitter: None,
            decider: Box::new(AlwaysRetry),
            classifier: None,
            seed: None,
            cursor: AtomicU32::new(0),
        }
    }
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to at least 1.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Advisory only; the engine never interrupts a running attempt.
    pub fn with_attempt_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.attempt_timeout_ms = ms;
        self
    }

    pub fn with_deadline_budget_ms(mut self, ms: Option<u64>) -> Self {
        self.deadline_budget_ms = ms;
        self
    }

    pub fn with_start_after_ms(mut self, ms: u64) -> Self {
        self.start_after_ms = ms;
        self
    }

    pub fn with_mode(mut self, mode: BackoffMode) -> Self {
        self.mode = mode;
        self
    }

    /// Also switches the mode to exponential.
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.mode = BackoffMode::Exponential;
        self.exponential_base = base;
        self
    }

    /// Linear increment. Also switches the mode to linear.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.mode = BackoffMode::Linear;
        self.delay_ms = Some(ms);
        self
    }

    /// Also switches the mode to sequence.
    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.mode = BackoffMode::Sequence;
        self.sequence = Some(sequence);
        self
    }

    pub fn with_follow_headers(mut self, follow: bool) -> Self {
        self.follow_headers = follow;
        self
    }

    /// Hard ceiling applied last. `Some(0)` clamps every delay to zero.
    pub fn with_cap_ms(mut self, ms: Option<u64>) -> Self {
        self.cap_ms = ms;
        self
    }

    pub fn with_hedge(mut self, hedge: HedgeSpec) -> Self {
        self.hedge = Some(hedge);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_decider(mut self, decider: impl RetryDecider + 'static) -> Self {
        self.decider = Box::new(decider);
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Makes jitter deterministic.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn attempt_timeout_ms(&self) -> Option<u64> {
        self.attempt_timeout_ms
    }

    pub fn deadline_budget_ms(&self) -> Option<u64> {
        self.deadline_budget_ms
    }

    /// Delay before the first attempt, jittered when jitter is configured.
    pub fn start_after_ms(&self) -> u64 {
        match &self.jitter {
            Some(j) => j.apply(self.start_after_ms, self.seed),
            None => self.start_after_ms,
        }
    }

    pub fn mode(&self) -> BackoffMode {
        self.mode
    }

    pub fn exponential_base(&self) -> f64 {
        self.exponential_base
    }

    pub fn delay_ms(&self) -> Option<u64> {
        self.delay_ms
    }

    pub fn follow_headers(&self) -> bool {
        self.follow_headers
    }

    pub fn cap_ms(&self) -> Option<u64> {
        self.cap_ms
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    pub fn hedge(&self) -> Option<&HedgeSpec> {
        self.hedge.as_ref()
    }

    pub fn jitter(&self) -> Option<&Jitter> {
        self.jitter.as_ref()
    }

    pub fn decider(&self) -> &dyn RetryDecider {
        self.decider.as_ref()
    }

    pub fn classifier(&self) -> Option<&Classifier> {
        self.classifier.as_ref()
    }

    pub fn classifier_mut(&mut self) -> Option<&mut Classifier> {
        self.classifier.as_mut()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Delay before `attempt` (1-based): nominal by mode, then jitter, then cap.
    ///
    /// With `None` the internal cursor supplies the attempt number and
    /// advances; it starts at 0 and is never clamped.
    pub fn next_delay_ms(&self, attempt: Option<u32>) -> u64 {
        let attempt = match attempt {
            Some(n) => i64::from(n.max(1)),
            None => i64::from(self.cursor.fetch_add(1, Ordering::Relaxed)),
        };
        let mut delay = self.nominal_delay_ms(attempt);
        if let Some(j) = &self.jitter {
            delay = j.apply(delay, self.seed);
        }
        match self.cap_ms {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    pub fn reset_cursor(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }

    fn nominal_delay_ms(&self, attempt: i64) -> u64 {
        match self.mode {
            BackoffMode::Linear => {
                let steps = (attempt - 1).max(1) as u64;
                steps.saturating_mul(self.delay_ms.unwrap_or(0))
            }
            BackoffMode::Sequence => u32::try_from(attempt)
                .ok()
                .and_then(|a| self.sequence.as_ref()?.delay_by_position(a))
                .unwrap_or(0),
            BackoffMode::Exponential => {
                let n = (attempt - 1).max(0);
                let exponent = i32::try_from(n - 1).unwrap_or(i32::MAX);
                let delay = (self.start_after_ms as f64 * self.exponential_base.powi(exponent)).round();
                if delay.is_finite() && delay > 0.0 {
                    delay.min(u64::MAX as f64) as u64
                } else {
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::JitterMode;

    #[test]
    fn linear_uses_delay_as_increment() {
        let p = Policy::new().with_delay_ms(100);
        assert_eq!(p.mode(), BackoffMode::Linear);
        assert_eq!(p.next_delay_ms(Some(1)), 100);
        assert_eq!(p.next_delay_ms(Some(2)), 100);
        assert_eq!(p.next_delay_ms(Some(3)), 200);
        assert_eq!(p.next_delay_ms(Some(5)), 400);
    }

    #[test]
    fn exponential_exponent_is_attempt_minus_two() {
        let p = Policy::new().with_start_after_ms(100).with_exponential_base(2.0);
        assert_eq!(p.next_delay_ms(Some(1)), 50);
        assert_eq!(p.next_delay_ms(Some(2)), 100);
        assert_eq!(p.next_delay_ms(Some(3)), 200);
        assert_eq!(p.next_delay_ms(Some(4)), 400);
        assert_eq!(Policy::new().next_delay_ms(Some(4)), 0);
    }

    #[test]
    fn sequence_by_position_and_missing_positions_are_zero() {
        let p = Policy::new().with_sequence(Sequence::new(vec![10, 20], false));
        assert_eq!(p.next_delay_ms(Some(1)), 10);
        assert_eq!(p.next_delay_ms(Some(2)), 20);
        assert_eq!(p.next_delay_ms(Some(3)), 0);
        assert_eq!(Policy::new().with_mode(BackoffMode::Sequence).next_delay_ms(Some(1)), 0);
    }

    #[test]
    fn cap_is_the_final_clamp() {
        let p = Policy::new()
            .with_delay_ms(1_000)
            .with_jitter(Jitter::window(5_000, JitterMode::PlusMinus))
            .with_cap_ms(Some(1_500));
        for attempt in 1..20 {
            assert!(p.next_delay_ms(Some(attempt)) <= 1_500);
        }
        let zero = Policy::new().with_delay_ms(1_000).with_cap_ms(Some(0));
        assert_eq!(zero.next_delay_ms(Some(4)), 0);
        let uncapped = Policy::new().with_delay_ms(1_000);
        assert_eq!(uncapped.next_delay_ms(Some(4)), 3_000);
    }

    #[test]
    fn cursor_starts_at_zero_and_resets() {
        let p = Policy::new().with_sequence(Sequence::new(vec![5, 15, 45], true));
        // Cursor position 0 has no sequence slot.
        assert_eq!(p.next_delay_ms(None), 0);
        assert_eq!(p.next_delay_ms(None), 5);
        assert_eq!(p.next_delay_ms(None), 15);
        p.reset_cursor();
        assert_eq!(p.next_delay_ms(None), 0);
        assert_eq!(p.next_delay_ms(None), 5);
    }

    #[test]
    fn start_after_is_jittered() {
        let p = Policy::new()
            .with_start_after_ms(1_000)
            .with_jitter(Jitter::window(200, JitterMode::PlusMinus))
            .with_seed(Some(9));
        let first = p.start_after_ms();
        assert!((800..=1_200).contains(&first));
        assert_eq!(p.start_after_ms(), first);
        assert_eq!(Policy::new().with_start_after_ms(250).start_after_ms(), 250);
    }

    #[test]
    fn attempts_are_at_least_one() {
        assert_eq!(Policy::new().attempts(), DEFAULT_ATTEMPTS);
        assert_eq!(Policy::new().with_attempts(0).attempts(), 1);
    }

    #[test]
    fn mode_aliases() {
        assert_eq!("lin".parse::<BackoffMode>().unwrap(), BackoffMode::Linear);
        assert_eq!("EXP".parse::<BackoffMode>().unwrap(), BackoffMode::Exponential);
        assert_eq!("seq".parse::<BackoffMode>().unwrap(), BackoffMode::Sequence);
        assert!("fib".parse::<BackoffMode>().is_err());
    }
}
