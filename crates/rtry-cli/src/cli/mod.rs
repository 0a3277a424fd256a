//! CLI for rtry: run a command under a retry policy.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use rtry_core::config::DEFAULT_PROFILE;

use commands::{run_command, run_completions, run_duration_format, run_duration_parse, run_schedule};

/// Top-level CLI for rtry.
#[derive(Debug, Parser)]
#[command(name = "rtry")]
#[command(about = "rtry: retry a command with backoff, jitter and failure classification", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a program, retrying it under a policy profile until it exits 0.
    Run {
        /// Policy profile from the config file. `default` retries any failure,
        /// `transient` only timeouts, resets, 5XX and similar.
        #[arg(long, default_value = DEFAULT_PROFILE, value_name = "NAME")]
        profile: String,
        /// Override the profile's attempt count.
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,
        /// Program and arguments, after `--`.
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Print the delay before each attempt for a profile.
    Schedule {
        /// Policy profile from the config file.
        #[arg(long, default_value = DEFAULT_PROFILE, value_name = "NAME")]
        profile: String,
    },

    /// Convert between duration tokens and milliseconds.
    Duration {
        #[command(subcommand)]
        action: DurationAction,
    },

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum DurationAction {
    /// Token (e.g. `1.5s`, `2m`, `250`) to milliseconds.
    Parse { token: String },
    /// Milliseconds to the shortest token.
    Format { ms: u64 },
}

impl CliCommand {
    /// Parse arguments and dispatch. Returns the process exit code.
    pub fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                profile,
                attempts,
                command,
            } => return run_command(&profile, attempts, &command),
            CliCommand::Schedule { profile } => run_schedule(&profile)?,
            CliCommand::Duration { action } => match action {
                DurationAction::Parse { token } => run_duration_parse(&token)?,
                DurationAction::Format { ms } => run_duration_format(ms),
            },
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests;
