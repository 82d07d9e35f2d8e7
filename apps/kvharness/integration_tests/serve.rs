use kvharness::cli::{ConfigSource, run, serve};
use kvharness::error::HarnessAppError;

use harness_core::supervisor::{LaunchOptions, LogSink, Supervisor, SupervisorSettings, TokioLauncher};

use std::time::{Duration, Instant};

// ============================================================================
// Integration tests for the binary's launch/close wiring
// These use the real launcher; no server binary is available in CI, so they
// cover the failure paths that must not hang.
// ============================================================================

/// **VALUE**: Verifies a missing server binary fails `serve` before the shutdown future is polled.
///
/// **WHY THIS MATTERS**: If launch errors were swallowed, the binary would sit waiting
/// for Ctrl-C with no server behind it.
///
/// **BUG THIS CATCHES**: Would catch if the launch error is not propagated, or if the
/// readiness budget is spent on a process that never started.
#[tokio::test]
async fn given_missing_binary_when_serving_then_core_error_without_waiting() {
    // GIVEN: A supervisor pointed at a binary that does not exist
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = SupervisorSettings::new(dir.path().join("kvstore-server"), dir.path())
        .with_log_sink(LogSink::Null);
    let supervisor = Supervisor::new(TokioLauncher, settings);

    // WHEN: Serving with a shutdown future that never resolves
    let started = Instant::now();
    let result = serve(
        &supervisor,
        None,
        LaunchOptions::new(),
        true,
        std::future::pending::<()>(),
    )
    .await;

    // THEN: A Core error, immediately
    assert!(matches!(result, Err(HarnessAppError::Core { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// **VALUE**: Verifies `run` reads the config file and launches the binary it names.
///
/// **WHY THIS MATTERS**: Relative paths in the config resolve against the config's
/// directory; a wrong base would make every suite config unusable.
#[tokio::test]
async fn given_config_naming_missing_binary_when_run_then_launch_error() {
    // GIVEN: A config next to a template, naming a binary that is not there
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("kvstore.conf"), "db-path ./db\n").expect("write template");
    let config_path = dir.path().join("kvharness.toml");
    std::fs::write(
        &config_path,
        "[server]\nbinary = \"bin/kvstore-server\"\ntemplate = \"kvstore.conf\"\n",
    )
    .expect("write config");

    // WHEN: Running
    let result = run(&ConfigSource::Explicit(config_path)).await;

    // THEN: The launch failed, and the generated config was discarded
    match result {
        Err(HarnessAppError::Core { message, .. }) => {
            assert!(message.contains("Spawn Error"), "Unexpected error: {message}");
        }
        other => panic!("Expected Core error, got {other:?}"),
    }
    let entries = std::fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(entries, 2, "Only the template and the config should remain");
}

/// **VALUE**: Verifies an invalid config is rejected before anything is launched.
#[tokio::test]
async fn given_invalid_config_when_run_then_core_error() {
    // GIVEN: A config with zero probe attempts
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("kvharness.toml");
    std::fs::write(&config_path, "[probe]\nattempts = 0\n").expect("write config");

    // WHEN: Running
    let result = run(&ConfigSource::Explicit(config_path)).await;

    // THEN: A Core error naming the field
    match result {
        Err(HarnessAppError::Core { message, .. }) => {
            assert!(message.contains("probe.attempts"), "Unexpected error: {message}");
        }
        other => panic!("Expected Core error, got {other:?}"),
    }
}
