//! Time source and sleep capability used by the engine.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source. Deadlines and not-before instants are measured against it.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Current time as Unix epoch milliseconds.
    fn now_unix_ms(&self) -> i64 {
        unix_ms(self.now())
    }
}

/// Blocking sleep. Non-positive durations must be a no-op.
pub trait Sleeper: Send + Sync {
    fn sleep_ms(&self, ms: u64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep_ms(&self, ms: u64) {
        if ms == 0 {
            return;
        }
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// A clock that only moves when told to. Useful for deterministic retry schedules.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock starting at the given Unix epoch milliseconds.
    pub fn at_unix_ms(ms: u64) -> Self {
        Self::new(UNIX_EPOCH + Duration::from_millis(ms))
    }

    pub fn advance_ms(&self, ms: u64) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += Duration::from_millis(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub(crate) fn unix_ms(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

/// Milliseconds from `now` until `deadline`, rounded, never negative.
pub(crate) fn remaining_ms(deadline: SystemTime, now: SystemTime) -> u64 {
    deadline
        .duration_since(now)
        .map(|d| ((d.as_micros() + 500) / 1_000) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at_unix_ms(1_700_000_000_000);
        assert_eq!(clock.now_unix_ms(), 1_700_000_000_000);
        clock.advance_ms(1_500);
        assert_eq!(clock.now_unix_ms(), 1_700_000_001_500);
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let t0 = UNIX_EPOCH + Duration::from_secs(100);
        assert_eq!(remaining_ms(t0, t0 + Duration::from_millis(5)), 0);
        assert_eq!(remaining_ms(t0 + Duration::from_millis(300), t0), 300);
        assert_eq!(remaining_ms(t0 + Duration::from_micros(1_600), t0), 2);
    }
}
