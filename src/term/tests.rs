//! End-to-end tests against real programs on a real pty.

#![allow(clippy::unwrap_used)]

use std::thread;
use std::time::{Duration, Instant};

use super::*;

const TIMEOUT: Duration = Duration::from_secs(10);

fn sh_config() -> TermConfig {
    let mut config = TermConfig::with_command("/bin/sh");
    config.ready_markers = vec!["$ ".to_string()];
    config
}

/// A shell that has printed its first prompt, with the buffer drained.
fn ready_shell(config: TermConfig) -> AgTerm {
    let term = AgTerm::new(config).unwrap();
    let prompt = term.read_until_ready(TIMEOUT).unwrap();
    assert!(prompt.contains("$ "), "unexpected first prompt: {prompt:?}");
    term
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn test_echo_returns_output_and_prompt() {
    let term = ready_shell(sh_config());

    let output = term.send_and_read_until_ready("echo hi", TIMEOUT).unwrap();

    assert!(output.lines().any(|line| line == "hi"), "output: {output:?}");
    assert!(output.ends_with("$ "), "output: {output:?}");
    assert_eq!(term.buffer_len(), 0);
}

#[test]
fn test_line_endings_are_normalized() {
    let term = ready_shell(sh_config());

    let output = term.send_and_read_until_ready("printf 'a\\nb\\n'", TIMEOUT).unwrap();

    assert!(!output.contains('\r'), "output: {output:?}");
    assert!(output.contains("\na\nb\n$ "), "output: {output:?}");
}

#[test]
fn test_sequential_commands_do_not_leak() {
    let term = ready_shell(sh_config());

    let first = term.send_and_read_until_ready("echo first", TIMEOUT).unwrap();
    let second = term.send_and_read_until_ready("echo second", TIMEOUT).unwrap();

    assert!(first.contains("first"));
    assert!(second.contains("second"));
    assert!(!second.contains("first"), "second output: {second:?}");
}

#[test]
fn test_trailing_whitespace_is_trimmed_from_commands() {
    let term = ready_shell(sh_config());

    let output = term.send_and_read_until_ready("echo trimmed   \n\n", TIMEOUT).unwrap();

    // One command line, one prompt: the extra newlines were not sent.
    assert_eq!(output.matches("$ ").count(), 1, "output: {output:?}");
    assert!(output.lines().any(|line| line == "trimmed"));
}

#[test]
fn test_timeout_keeps_output_for_next_read() {
    let term = ready_shell(sh_config());
    let mut markers = vec!["never-printed> ".to_string()];

    term.write("echo partial").unwrap();
    let err = term.read_until_any(&markers, Duration::from_millis(500)).unwrap_err();
    assert!(matches!(err, TermError::Timeout { .. }));
    assert!(term.buffer_len() > 0);

    markers.push("$ ".to_string());
    let output = term.read_until_any(&markers, TIMEOUT).unwrap();
    assert!(output.lines().any(|line| line == "partial"), "output: {output:?}");
}

#[test]
fn test_close_stops_session() {
    let term = AgTerm::new(TermConfig::with_command("sleep 30")).unwrap();
    assert!(term.is_alive());
    assert!(term.pid().is_some());

    term.close();

    assert!(!term.is_alive());
    assert_eq!(term.run_state(), RunState::Stopped);
    assert!(term.pid().is_none());

    let started = Instant::now();
    let err = term.read_until_ready(TIMEOUT).unwrap_err();
    assert!(matches!(err, TermError::ProcessDied), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));

    // No input side any more: writes are silently dropped.
    assert!(term.write("echo ignored").is_ok());
    term.close();
}

#[test]
fn test_start_twice_is_rejected() {
    let term = AgTerm::new(TermConfig::with_command("sleep 30")).unwrap();
    assert!(matches!(term.start(), Err(TermError::Session(_))));
}

#[test]
fn test_restart_clears_buffer_and_history() {
    let term = AgTerm::new(TermConfig::with_command("sleep 30")).unwrap();
    let first_pid = term.pid();

    // `sleep` prints nothing; the terminal echo of typed input is the only output.
    term.write_raw(b"typed ahead").unwrap();
    assert!(wait_until(Duration::from_secs(5), || term.history_len() > 0));
    assert!(term.buffer_len() > 0);

    let prompt = term.restart(false, TIMEOUT).unwrap();

    assert!(prompt.is_none());
    assert_eq!(term.buffer_len(), 0);
    assert_eq!(term.history_len(), 0);
    assert!(term.is_alive());
    assert_ne!(term.pid(), first_pid);
}

#[test]
fn test_exited_program_is_dead_until_restarted() {
    let term = ready_shell(sh_config());

    term.write("exit").unwrap();
    let err = term.read_until_ready(TIMEOUT).unwrap_err();
    assert!(matches!(err, TermError::ProcessDied), "got {err:?}");
    assert!(!term.is_alive());

    let prompt = term.restart(true, TIMEOUT).unwrap();
    assert!(prompt.is_some_and(|p| p.contains("$ ")));

    let output = term.send_and_read_until_ready("echo back", TIMEOUT).unwrap();
    assert!(output.lines().any(|line| line == "back"));
}

#[test]
fn test_history_is_capped() {
    let mut config = sh_config();
    config.max_history_bytes = 64;
    let term = ready_shell(config);

    let output = term.send_and_read_until_ready("printf '%0200d\\n' 0", TIMEOUT).unwrap();

    assert!(output.contains(&"0".repeat(200)));
    assert!(term.history_len() <= 64);
    assert!(term.history().ends_with("$ "));
}

#[test]
fn test_interrupt_returns_to_prompt() {
    let term = ready_shell(sh_config());

    term.write("sleep 30").unwrap();
    thread::sleep(Duration::from_millis(200));
    term.send_control('c').unwrap();

    let started = Instant::now();
    let output = term.read_until_ready(TIMEOUT).unwrap();
    assert!(output.contains("$ "));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(term.is_alive());
}

#[test]
fn test_non_letter_control_is_ignored() {
    let term = AgTerm::new(TermConfig::with_command("sleep 30")).unwrap();
    assert!(term.send_control('1').is_ok());
    assert!(term.is_alive());
}

#[test]
fn test_quoted_command_line_runs_under_shell() {
    let mut config = TermConfig::with_command("sh -c 'echo launched-ok; exec sh'");
    config.ready_markers = vec!["$ ".to_string()];
    let term = AgTerm::new(config).unwrap();

    let output = term.read_until_ready(TIMEOUT).unwrap();

    assert!(output.lines().any(|line| line == "launched-ok"), "output: {output:?}");
    assert!(term.is_alive());
}

#[test]
fn test_env_prefix_in_command_line() {
    let term = ready_shell({
        let mut config = TermConfig::with_command("GREETING='hi there' sh");
        config.ready_markers = vec!["$ ".to_string()];
        config
    });

    let output = term.send_and_read_until_ready("echo \"$GREETING\"", TIMEOUT).unwrap();

    assert!(output.lines().any(|line| line == "hi there"), "output: {output:?}");
}

#[test]
fn test_missing_program_is_reported_by_shell() {
    let term = AgTerm::new(TermConfig::with_command("/nonexistent/agterm-missing")).unwrap();

    let err = term.read_until_ready(TIMEOUT).unwrap_err();
    assert!(matches!(err, TermError::ProcessDied), "got {err:?}");

    assert!(wait_until(Duration::from_secs(5), || term.run_state() == RunState::Stopped));
    assert!(term.history().contains("agterm-missing"), "history: {:?}", term.history());
}

#[test]
fn test_spawn_failure() {
    let mut config = TermConfig::with_command("true");
    config.cwd = Some("/nonexistent/agterm-missing-dir".into());
    let err = AgTerm::new(config).err();
    assert!(matches!(err, Some(TermError::Session(_))));

    let err = AgTerm::new(TermConfig::with_command("")).err();
    assert!(matches!(err, Some(TermError::Config(_))));
}
