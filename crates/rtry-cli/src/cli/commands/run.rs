//! `rtry run` – execute a program under a retry policy.

use anyhow::{Context as _, Result};
use rtry_core::classify::{Context, Failure};
use rtry_core::config;
use rtry_core::duration::format_ms;
use rtry_core::{Engine, RetryError};
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};

/// Bytes of child stderr kept in the failure message.
const STDERR_TAIL_BYTES: usize = 2048;

/// Exit code reported when the program could not be started.
const SPAWN_FAILED_EXIT: i32 = 127;

/// One failed run of the wrapped program.
///
/// The message carries the stderr tail so text such as "connection reset"
/// or "deadlock detected" produces the matching tags.
#[derive(Debug)]
pub struct CommandFailure {
    program: String,
    exit_status: Option<i32>,
    stderr_tail: String,
    spawn_error: Option<io::Error>,
}

impl CommandFailure {
    pub fn exited(program: &str, exit_status: Option<i32>, stderr: &[u8]) -> Self {
        Self {
            program: program.to_string(),
            exit_status,
            stderr_tail: tail(stderr),
            spawn_error: None,
        }
    }

    pub fn spawn_failed(program: &str, err: io::Error) -> Self {
        Self {
            program: program.to_string(),
            exit_status: None,
            stderr_tail: String::new(),
            spawn_error: Some(err),
        }
    }

    /// Exit code for rtry itself once retries are exhausted.
    pub fn exit_code(&self) -> i32 {
        match (&self.spawn_error, self.exit_status) {
            (Some(_), _) => SPAWN_FAILED_EXIT,
            (None, Some(code)) => code,
            (None, None) => 1,
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.spawn_error.is_some() {
            return write!(f, "failed to start `{}`", self.program);
        }
        match self.exit_status {
            Some(code) => write!(f, "`{}` exited with status {}", self.program, code)?,
            None => write!(f, "`{}` was terminated by a signal", self.program)?,
        }
        if !self.stderr_tail.is_empty() {
            write!(f, ": {}", self.stderr_tail)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.spawn_error
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// `code()` stays `None`: exit statuses 100-255 would otherwise classify as HTTP statuses.
impl Failure for CommandFailure {}

/// Last `STDERR_TAIL_BYTES` of stderr, trimmed, on a char boundary.
fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let mut start = text.len().saturating_sub(STDERR_TAIL_BYTES);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

fn spawn_once(program: &str, args: &[String]) -> std::result::Result<(), CommandFailure> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| CommandFailure::spawn_failed(program, e))?;

    // Pass the child's stderr through; it was only captured for classification.
    let _ = io::stderr().write_all(&output.stderr);

    if output.status.success() {
        Ok(())
    } else {
        Err(CommandFailure::exited(program, output.status.code(), &output.stderr))
    }
}

/// Run `argv` under the named profile. Returns the exit code rtry should use.
pub fn run_command(profile: &str, attempts: Option<u32>, argv: &[String]) -> Result<i32> {
    let (program, args) = argv.split_first().context("no program given after `--`")?;
    let cfg = config::load_or_init()?;
    let mut policy = cfg
        .profile(profile)
        .with_context(|| format!("loading profile `{profile}`"))?;
    if let Some(n) = attempts {
        policy = policy.with_attempts(n);
    }
    tracing::debug!(profile, program = %program, attempts = policy.attempts(), "rtry run");

    let engine = Engine::default().on_between_attempts(|ctx, outcome, _, sleep_ms, _| {
        let reason = outcome.error().map(|e| e.to_string()).unwrap_or_default();
        eprintln!(
            "rtry: attempt {}/{} failed ({}); retrying in {}",
            ctx.attempt_number(),
            ctx.max_attempts(),
            reason,
            format_ms(sleep_ms)
        );
        Ok(())
    });

    match engine.run(&policy, Context::new(), |_| spawn_once(program, args)) {
        Ok(()) => Ok(0),
        Err(RetryError::Operation(failure)) => {
            eprintln!("rtry: giving up: {failure}");
            Ok(failure.exit_code())
        }
        Err(err) => Err(err.into()),
    }
}
