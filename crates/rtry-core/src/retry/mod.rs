//! Retry engine: attempt loop, timing and deadline accounting, hooks.

mod clock;
mod context;
mod error;
mod outcome;
mod run;

pub use clock::{Clock, ManualClock, Sleeper, SystemClock, ThreadSleeper};
pub use context::AttemptContext;
pub use error::{DeadlineReached, RetryError};
pub use outcome::AttemptOutcome;
pub use run::{BetweenAttemptsHook, Engine, GiveUpHook};
