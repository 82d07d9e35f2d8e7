// Unit tests for process module private functions
// Shutdown behaviour against doubles is covered in integration_tests/supervisor/shutdown.rs

use crate::supervisor::process::{
    LaunchCommand, LogSink, ManagedProcess, ProcessLauncher, TokioLauncher, build_spawn_command,
    interrupt_pid, with_process,
};

use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::timeout;

fn sleep_command(seconds: &str, log_sink: LogSink) -> LaunchCommand {
    LaunchCommand {
        program: PathBuf::from("sleep"),
        args: vec![OsString::from(seconds)],
        address: SocketAddr::from((Ipv4Addr::LOCALHOST, 1)),
        log_sink,
    }
}

/// **VALUE**: Verifies that `build_spawn_command()` uses the configured program and args.
///
/// **WHY THIS MATTERS**: The config path must be the first positional argument,
/// followed by the flag pairs, exactly as the supervisor assembled them.
///
/// **BUG THIS CATCHES**: Would catch if arguments are reordered or dropped while
/// building the command.
#[test]
fn given_launch_command_when_build_spawn_command_called_then_keeps_program_and_args() {
    // GIVEN: A command with a config path and a flag pair
    let command = LaunchCommand {
        program: PathBuf::from("/opt/kvstore/bin/kvstore-server"),
        args: vec![
            OsString::from("/work/kvstore_1.conf"),
            OsString::from("--port"),
            OsString::from("7777"),
        ],
        address: SocketAddr::from((Ipv4Addr::LOCALHOST, 7777)),
        log_sink: LogSink::Null,
    };

    // WHEN: Building the tokio command
    let cmd = build_spawn_command(&command);

    // THEN: Program and args are passed through in order
    let std_cmd = cmd.as_std();
    assert_eq!(std_cmd.get_program(), "/opt/kvstore/bin/kvstore-server");
    let args: Vec<_> = std_cmd.get_args().collect();
    assert_eq!(args, ["/work/kvstore_1.conf", "--port", "7777"]);
}

/// **VALUE**: Tests that `with_process()` gracefully handles non-existent PIDs.
///
/// **BUG THIS CATCHES**: Prevents panics when signalling a server that already exited.
#[test]
fn given_nonexistent_pid_when_with_process_called_then_returns_none() {
    // GIVEN: A PID that doesn't exist
    let fake_pid = u32::MAX;

    // WHEN: Calling with_process with the invalid PID
    let result = with_process(fake_pid, |_| true);

    // THEN: Should return None
    assert!(result.is_none(), "Should return None for non-existent process");
}

/// **VALUE**: Tests that `with_process()` executes the closure for valid PIDs.
#[test]
fn given_own_pid_when_with_process_called_then_executes_closure() {
    // GIVEN: Our own PID
    let our_pid = std::process::id();

    // WHEN: Reading the pid back through sysinfo
    let result = with_process(our_pid, |p| p.pid().as_u32());

    // THEN: Closure ran on the right process
    assert_eq!(result, Some(our_pid));
}

/// **VALUE**: Tests that signalling a missing PID is an error, not a panic.
#[test]
fn given_nonexistent_pid_when_interrupted_then_returns_not_found() {
    // GIVEN / WHEN
    let result = interrupt_pid(u32::MAX);

    // THEN
    assert_eq!(
        result.map_err(|e| e.kind()),
        Err(std::io::ErrorKind::NotFound)
    );
}

/// **VALUE**: Verifies the real launcher delivers SIGINT and reaps the child.
///
/// **WHY THIS MATTERS**: This is the graceful half of every close. If the signal
/// never arrives, every shutdown degrades to a forced kill after the full timeout.
///
/// **BUG THIS CATCHES**: Would catch a wrong signal mapping in sysinfo or a wait
/// that never resolves.
#[cfg(unix)]
#[tokio::test]
async fn given_running_child_when_signalled_then_exits_by_signal() {
    // GIVEN: A long sleep launched through the real launcher
    let mut process = TokioLauncher
        .launch(&sleep_command("30", LogSink::Null))
        .expect("sleep should spawn");
    assert!(process.id().is_some());

    // WHEN: Sending the graceful signal
    process.signal().expect("signal delivered");

    // THEN: The child exits promptly, killed by the signal (no exit code)
    let exit = timeout(Duration::from_secs(5), process.wait())
        .await
        .expect("child exits after SIGINT")
        .expect("wait succeeds");
    assert_eq!(exit.code, None);
    assert!(!exit.success());
}

/// **VALUE**: Verifies kill reaps a child and a later signal reports it gone.
#[cfg(unix)]
#[tokio::test]
async fn given_killed_child_when_signalled_then_reports_exited() {
    // GIVEN: A running child
    let mut process = TokioLauncher
        .launch(&sleep_command("30", LogSink::Log))
        .expect("sleep should spawn");

    // WHEN: Killing it, then signalling
    process.kill().await.expect("kill succeeds");
    let result = process.signal();

    // THEN: Signal reports the process as gone
    assert!(result.is_err(), "Signalling a reaped child should fail");
}

/// **VALUE**: Verifies a missing binary surfaces as a spawn error.
///
/// **BUG THIS CATCHES**: Would catch a panic on spawn failure.
#[tokio::test]
async fn given_missing_binary_when_launched_then_returns_spawn_error() {
    // GIVEN: A program that does not exist
    let command = LaunchCommand {
        program: PathBuf::from("/nonexistent/kvstore-server-12345"),
        args: Vec::new(),
        address: SocketAddr::from((Ipv4Addr::LOCALHOST, 1)),
        log_sink: LogSink::Null,
    };

    // WHEN: Launching
    let result = TokioLauncher.launch(&command);

    // THEN: Spawn error
    assert!(matches!(
        result,
        Err(crate::error::spawn::SpawnError::Spawn { .. })
    ));
}

/// **VALUE**: Verifies the file sink receives the child's output.
///
/// **WHY THIS MATTERS**: A server that fails its readiness probe is diagnosed from
/// this file.
#[cfg(unix)]
#[tokio::test]
async fn given_file_sink_when_child_writes_then_output_lands_in_file() {
    // GIVEN: A child that prints a line, with output sent to a file
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("server.log");
    let command = LaunchCommand {
        program: PathBuf::from("echo"),
        args: vec![OsString::from("server booting")],
        address: SocketAddr::from((Ipv4Addr::LOCALHOST, 1)),
        log_sink: LogSink::File(log_path.clone()),
    };

    // WHEN: Running it to completion
    let mut process = TokioLauncher.launch(&command).expect("echo should spawn");
    let exit = process.wait().await.expect("wait succeeds");

    // THEN: The line is in the log file
    assert!(exit.success());
    let contents = std::fs::read_to_string(&log_path).expect("log file exists");
    assert!(contents.contains("server booting"));
}
