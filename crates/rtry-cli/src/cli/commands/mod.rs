//! CLI command handlers, one file per command.

mod completions;
mod duration;
mod run;
mod schedule;

pub use completions::run_completions;
pub use duration::{run_duration_format, run_duration_parse};
pub use run::run_command;
#[cfg(test)]
pub use run::CommandFailure;
pub use schedule::run_schedule;
#[cfg(test)]
pub use schedule::schedule_rows;
