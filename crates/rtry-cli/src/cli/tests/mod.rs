use super::commands::{schedule_rows, CommandFailure};
use super::*;
use rtry_core::classify::{tokens, Classifier, Failure, MethodStatus};
use rtry_core::Policy;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_run_defaults() {
    match parse(&["rtry", "run", "--", "curl", "-f", "https://example.com"]) {
        CliCommand::Run {
            profile,
            attempts,
            command,
        } => {
            assert_eq!(profile, "default");
            assert_eq!(attempts, None);
            assert_eq!(command, ["curl", "-f", "https://example.com"]);
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_with_profile_and_attempts() {
    match parse(&["rtry", "run", "--profile", "db", "--attempts", "7", "--", "psql", "-c", "select 1"]) {
        CliCommand::Run {
            profile,
            attempts,
            command,
        } => {
            assert_eq!(profile, "db");
            assert_eq!(attempts, Some(7));
            assert_eq!(command.len(), 3);
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_requires_command() {
    assert!(Cli::try_parse_from(["rtry", "run"]).is_err());
}

#[test]
fn cli_parse_schedule() {
    match parse(&["rtry", "schedule", "--profile", "api"]) {
        CliCommand::Schedule { profile } => assert_eq!(profile, "api"),
        _ => panic!("expected Schedule"),
    }
}

#[test]
fn cli_parse_duration_actions() {
    match parse(&["rtry", "duration", "parse", "1.5s"]) {
        CliCommand::Duration {
            action: DurationAction::Parse { token },
        } => assert_eq!(token, "1.5s"),
        _ => panic!("expected Duration Parse"),
    }
    match parse(&["rtry", "duration", "format", "90000"]) {
        CliCommand::Duration {
            action: DurationAction::Format { ms },
        } => assert_eq!(ms, 90_000),
        _ => panic!("expected Duration Format"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["rtry", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["rtry", "frobnicate"]).is_err());
}

#[test]
fn schedule_lists_every_attempt() {
    let policy = Policy::new()
        .with_attempts(4)
        .with_start_after_ms(50)
        .with_delay_ms(100);
    assert_eq!(schedule_rows(&policy), [(1, 50), (2, 100), (3, 200), (4, 300)]);
}

#[test]
fn command_failure_message_feeds_tags() {
    let failure = CommandFailure::exited("psql", Some(3), b"ERROR: deadlock detected\n");
    assert_eq!(failure.to_string(), "`psql` exited with status 3: ERROR: deadlock detected");
    assert_eq!(failure.exit_code(), 3);

    let meta = Classifier::new()
        .with_rule(MethodStatus::default())
        .classify(&failure);
    assert!(meta.has_tag(tokens::DEADLOCK));
    assert_eq!(meta.status_code, None);
}

#[test]
fn high_exit_status_is_not_an_http_status() {
    let failure = CommandFailure::exited("sleep", Some(130), b"");
    assert_eq!(failure.exit_code(), 130);
    assert_eq!(failure.code(), None);

    let meta = Classifier::new()
        .with_rule(MethodStatus::default())
        .classify(&failure);
    assert_eq!(meta.status_code, None);
}

#[test]
fn spawn_failure_exits_127() {
    let err = std::io::Error::from(std::io::ErrorKind::NotFound);
    let failure = CommandFailure::spawn_failed("no-such-binary", err);
    assert_eq!(failure.exit_code(), 127);
    assert!(std::error::Error::source(&failure).is_some());
}
