//! Hedging: speculative parallel lanes for a single attempt.
//!
//! [`HedgeSpec`] is plain policy data. [`race`] is the opt-in executor used by
//! [`crate::retry::Engine::run_hedged`]; the regular engine loop never races.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use crate::duration;
use crate::error::ConfigError;
use crate::retry::Sleeper;

/// Cancellation policy code: stop remaining lanes once one succeeds.
pub const CANCEL_ON_FIRST_SUCCESS: u32 = 1;
/// Cancellation policy code: let every lane run to completion.
pub const WAIT_ALL: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    #[default]
    OnFirstSuccess,
    WaitAll,
    /// Unrecognised code; carried through untouched and raced like `OnFirstSuccess`.
    Other(u32),
}

impl CancelPolicy {
    /// `0` (unset) maps to the default.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 | CANCEL_ON_FIRST_SUCCESS => CancelPolicy::OnFirstSuccess,
            WAIT_ALL => CancelPolicy::WaitAll,
            other => CancelPolicy::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            CancelPolicy::OnFirstSuccess => CANCEL_ON_FIRST_SUCCESS,
            CancelPolicy::WaitAll => WAIT_ALL,
            CancelPolicy::Other(code) => code,
        }
    }

    fn cancels_on_success(self) -> bool {
        !matches!(self, CancelPolicy::WaitAll)
    }
}

/// Lane count, stagger between lane starts, and cancellation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HedgeSpec {
    lanes: u32,
    stagger_ms: u64,
    cancel: CancelPolicy,
}

impl HedgeSpec {
    pub fn new(lanes: u32, stagger_ms: u64, cancel_code: Option<u32>) -> Result<Self, ConfigError> {
        if lanes < 1 {
            return Err(ConfigError::HedgeLanes(lanes));
        }
        Ok(Self {
            lanes,
            stagger_ms,
            cancel: CancelPolicy::from_code(cancel_code.unwrap_or(0)),
        })
    }

    pub fn lanes(&self) -> u32 {
        self.lanes
    }

    pub fn stagger_delay_ms(&self) -> u64 {
        self.stagger_ms
    }

    pub fn cancel_policy(&self) -> CancelPolicy {
        self.cancel
    }
}

impl fmt::Display for HedgeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.lanes, duration::format_ms(self.stagger_ms))?;
        if self.cancel != CancelPolicy::OnFirstSuccess {
            write!(f, "&{}", self.cancel.code())?;
        }
        Ok(())
    }
}

/// Handle given to each hedged lane.
#[derive(Debug)]
pub struct Lane<'a> {
    index: u32,
    cancelled: &'a AtomicBool,
}

impl Lane<'_> {
    /// 0-based lane index; lane 0 is the primary attempt.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Advisory: set once another lane has won. Long-running operations should poll it.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Run `op` once as lane 0, outside any race.
pub(crate) fn primary<T, E>(op: impl FnOnce(&Lane<'_>) -> Result<T, E>) -> Result<T, E> {
    let cancelled = AtomicBool::new(false);
    op(&Lane {
        index: 0,
        cancelled: &cancelled,
    })
}

type LaneResult<T, E> = thread::Result<Result<T, E>>;

/// Race up to `spec.lanes()` copies of `op`, lane `i` starting `i * stagger` after lane 0.
///
/// Every lane runs on its own detached thread. Under `OnFirstSuccess` the
/// first success returns at once; the cancel flag is raised and losing lanes
/// finish in the background, lanes not yet started are skipped. Under
/// `WaitAll` every lane is drained and the first success in completion order
/// wins. When no lane succeeds the last failure is returned; if every lane
/// panicked, the panic is resumed on the caller.
pub fn race<T, E, F>(spec: &HedgeSpec, sleeper: Arc<dyn Sleeper>, op: F) -> Result<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(&Lane<'_>) -> Result<T, E> + Send + Sync + 'static,
{
    if spec.lanes <= 1 {
        return primary(op);
    }

    let op = Arc::new(op);
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancels = spec.cancel.cancels_on_success();
    let (tx, rx) = mpsc::channel::<(u32, LaneResult<T, E>)>();

    for index in 0..spec.lanes {
        let tx = tx.clone();
        let op = Arc::clone(&op);
        let cancelled = Arc::clone(&cancelled);
        let sleeper = Arc::clone(&sleeper);
        let delay_ms = spec.stagger_ms.saturating_mul(u64::from(index));
        let spawned = thread::Builder::new()
            .name(format!("hedge-lane-{index}"))
            .spawn(move || {
                if index > 0 {
                    sleeper.sleep_ms(delay_ms);
                }
                if cancelled.load(Ordering::Acquire) {
                    tracing::debug!(lane = index, "hedge lane skipped; another lane already won");
                    return;
                }
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    op(&Lane {
                        index,
                        cancelled: &cancelled,
                    })
                }));
                if cancels && matches!(result, Ok(Ok(_))) {
                    cancelled.store(true, Ordering::Release);
                }
                let _ = tx.send((index, result));
            });
        if let Err(e) = spawned {
            tracing::warn!(lane = index, error = %e, "failed to start hedge lane");
        }
    }
    drop(tx);

    let mut winner = None;
    let mut last_err = None;
    let mut panicked = None;
    for (index, result) in rx {
        match result {
            Ok(Ok(value)) if cancels => {
                tracing::debug!(lane = index, "hedge lane won");
                return Ok(value);
            }
            Ok(Ok(value)) => {
                if winner.is_none() {
                    tracing::debug!(lane = index, "hedge lane won");
                    winner = Some(value);
                }
            }
            Ok(Err(e)) => last_err = Some(e),
            Err(payload) => {
                tracing::warn!(lane = index, "hedge lane panicked");
                panicked = Some(payload);
            }
        }
    }

    if let Some(value) = winner {
        return Ok(value);
    }
    if let Some(e) = last_err {
        return Err(e);
    }
    panic::resume_unwind(panicked.unwrap_or_else(|| Box::new("no hedge lane could be started") as Box<dyn Any + Send>))
}
