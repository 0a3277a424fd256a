//! Deterministic time for engine tests: a manual clock and a sleeper that advances it.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use rtry_core::retry::{Clock, ManualClock, Sleeper};
use rtry_core::Engine;

/// Fixed start instant so not-before headers can be written as literals.
pub const T0_UNIX_MS: u64 = 1_700_000_000_000;

/// Records every sleep and moves the shared clock forward by the same amount.
pub struct RecordingSleeper {
    clock: Arc<ManualClock>,
    sleeps: Mutex<Vec<u64>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep_ms(&self, ms: u64) {
        self.sleeps.lock().unwrap().push(ms);
        self.clock.advance_ms(ms);
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::at_unix_ms(T0_UNIX_MS));
        let sleeper = Arc::new(RecordingSleeper {
            clock: clock.clone(),
            sleeps: Mutex::new(Vec::new()),
        });
        Self { clock, sleeper }
    }

    pub fn engine(&self) -> Engine {
        Engine::new(
            self.clock.clone() as Arc<dyn Clock>,
            self.sleeper.clone() as Arc<dyn Sleeper>,
        )
    }

    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeper.sleeps()
    }
}
