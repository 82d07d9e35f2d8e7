use crate::helpers::{
    FakeRespServer, Script, ScriptedLauncher, Workspace, closed_address, fast_probe,
    scripted_supervisor,
};

use harness_core::error::CoreError;
use harness_core::error::readiness::ReadinessError;
use harness_core::error::shutdown::ShutdownError;
use harness_core::error::spawn::SpawnError;
use harness_core::supervisor::{LaunchOptions, LogSink, Supervisor, SupervisorSettings};

use std::time::{Duration, Instant};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// Public API tests for Supervisor::launch
// ============================================================================

/// **VALUE**: Verifies the happy path: provisioned config, argument order, ready handle.
///
/// **WHY THIS MATTERS**: This is the path every suite takes in its setup. The config
/// path must come first, followed by the flag pairs, and the handle must point at
/// the probed port.
///
/// **BUG THIS CATCHES**: Would catch if the config path is omitted, flags precede
/// it, or the handle is returned with the default port instead of the override.
#[tokio::test]
async fn given_template_and_port_when_launched_then_returns_ready_handle() {
    // GIVEN: A live server on an ephemeral port and a template
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching with a port override and a pass-through flag
    let handle = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new()
                .with_port(server.port())
                .with_flag("databases", "3"),
            true,
        )
        .await
        .expect("launch succeeds");

    // THEN: The handle points at the probed address
    assert_eq!(handle.address(), server.address());
    assert_eq!(handle.run_config().listen_port(), server.port());

    // AND: The server was started with config path, port, then flags
    let generated = handle
        .run_config()
        .generated_path()
        .expect("generated config")
        .to_string_lossy()
        .into_owned();
    assert_eq!(
        launcher.last_args(),
        [
            generated.clone(),
            "--port".to_string(),
            server.port().to_string(),
            "--databases".to_string(),
            "3".to_string(),
        ]
    );
    assert!(std::path::Path::new(&generated).exists());

    handle.close().await.expect("close succeeds");
}

/// **VALUE**: Verifies the readiness gate: the first client command succeeds.
///
/// **WHY THIS MATTERS**: Tests issue commands immediately after setup. If launch
/// returned before the server answered, the first command would race the bind.
///
/// **BUG THIS CATCHES**: Would catch a launch that returns before probing.
#[tokio::test]
async fn given_launched_server_when_new_client_used_then_first_command_succeeds() {
    // GIVEN: A launched server
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let supervisor = scripted_supervisor(
        &workspace,
        ScriptedLauncher::new(Script::default()),
        SHUTDOWN_TIMEOUT,
    );
    let handle = supervisor
        .launch(None, LaunchOptions::new().with_port(server.port()), false)
        .await
        .expect("launch succeeds");

    // WHEN: Using a fresh client right away
    let client = handle.new_client().expect("client opens");
    let mut conn = client.connection().await.expect("connects");
    let reply: String = redis::cmd("SET")
        .arg("key")
        .arg("value")
        .query_async(&mut conn)
        .await
        .expect("SET succeeds");
    let value: String = redis::cmd("GET")
        .arg("key")
        .query_async(&mut conn)
        .await
        .expect("GET succeeds");

    // THEN: The store answered on the first attempt
    assert_eq!(reply, "OK");
    assert_eq!(value, "value");
    assert_eq!(client.address(), server.address());

    handle.close().await.expect("close succeeds");
}

/// **VALUE**: Verifies that launching without a template passes no config argument.
#[tokio::test]
async fn given_no_template_when_launched_then_no_positional_config() {
    // GIVEN: A live server
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching without a template
    let handle = supervisor
        .launch(None, LaunchOptions::new().with_port(server.port()), true)
        .await
        .expect("launch succeeds");

    // THEN: Only the port flag was passed, nothing is owned
    assert_eq!(
        launcher.last_args(),
        ["--port".to_string(), server.port().to_string()]
    );
    assert!(handle.run_config().generated_path().is_none());
    assert!(!handle.run_config().owns_artifacts());

    handle.close().await.expect("close succeeds");
}

/// **VALUE**: Verifies probe exhaustion fails the launch within budget and kills the process.
///
/// **WHY THIS MATTERS**: A server that never becomes reachable must neither hang the
/// suite nor survive as an orphan holding its port and data directory.
///
/// **BUG THIS CATCHES**: Would catch an unbounded readiness loop, or a launch error
/// path that returns without killing the spawned process.
#[tokio::test]
async fn given_nothing_listening_when_launched_then_readiness_timeout_and_process_killed() {
    // GIVEN: A port nobody listens on
    let address = closed_address().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching with cleanup requested
    let started = Instant::now();
    let result = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(address.port()),
            true,
        )
        .await;
    let elapsed = started.elapsed();

    // THEN: Readiness timeout within the attempt budget
    assert!(
        matches!(result, Err(CoreError::Readiness(ReadinessError::Timeout { .. }))),
        "Expected readiness timeout"
    );
    assert!(
        elapsed < fast_probe().budget() + Duration::from_secs(1),
        "Launch took {elapsed:?}"
    );

    // AND: The spawned process was killed
    assert_eq!(launcher.kills(), 1);

    // AND: The generated config is gone, only the template remains
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 1);
}

/// **VALUE**: Verifies readiness failure keeps artifacts when cleanup was not requested.
///
/// **WHY THIS MATTERS**: Without `delete_on_close` the generated config is kept so a
/// failed start can be diagnosed.
#[tokio::test]
async fn given_no_cleanup_when_readiness_fails_then_generated_config_kept() {
    // GIVEN: A port nobody listens on
    let address = closed_address().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching without cleanup
    let result = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(address.port()),
            false,
        )
        .await;

    // THEN: Still killed, but the generated config survives
    assert!(result.is_err());
    assert_eq!(launcher.kills(), 1);
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 2);
}

/// **VALUE**: Verifies a failed kill after a readiness timeout keeps every artifact.
///
/// **WHY THIS MATTERS**: A process that refused the kill may still be running and
/// writing to its data directory. Deleting its files would corrupt it and hide the leak.
///
/// **BUG THIS CATCHES**: Would catch a launch that logs the kill failure and then
/// discards artifacts anyway.
#[tokio::test]
async fn given_kill_fails_when_readiness_times_out_then_kill_error_and_artifacts_kept() {
    // GIVEN: Nothing listening, and a process that cannot be killed
    let address = closed_address().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script {
        kill_fails: true,
        ..Script::default()
    });
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching with cleanup requested
    let result = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(address.port()),
            true,
        )
        .await;

    // THEN: The kill failure is what the caller sees
    assert!(
        matches!(result, Err(CoreError::Shutdown(ShutdownError::Kill { .. }))),
        "Expected kill error"
    );
    assert_eq!(launcher.kills(), 1);

    // AND: The generated config is still next to the template
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 2);
}

/// **VALUE**: Verifies a failed wait during startup is escalated to a kill.
///
/// **WHY THIS MATTERS**: A failed wait does not mean the process is gone. Treating
/// it as an exit would leave a live server behind with its files deleted.
///
/// **BUG THIS CATCHES**: Would catch a wait error reported as `ProcessExited`
/// without killing the process.
#[tokio::test]
async fn given_wait_fails_when_launched_then_wait_error_and_process_killed() {
    // GIVEN: A process whose wait fails right away
    let address = closed_address().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script {
        wait_fails: true,
        ..Script::default()
    });
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching with cleanup requested
    let result = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(address.port()),
            true,
        )
        .await;

    // THEN: A wait error, and the process was killed before cleanup
    assert!(
        matches!(result, Err(CoreError::Readiness(ReadinessError::Wait { .. }))),
        "Expected wait error"
    );
    assert_eq!(launcher.kills(), 1);
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 1);
}

/// **VALUE**: Verifies a failed wait plus a failed kill keeps every artifact.
#[tokio::test]
async fn given_wait_and_kill_fail_when_launched_then_kill_error_and_artifacts_kept() {
    // GIVEN: A process whose wait fails and which cannot be killed
    let address = closed_address().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script {
        wait_fails: true,
        kill_fails: true,
        ..Script::default()
    });
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching with cleanup requested
    let result = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(address.port()),
            true,
        )
        .await;

    // THEN: Kill error, nothing removed
    assert!(matches!(
        result,
        Err(CoreError::Shutdown(ShutdownError::Kill { .. }))
    ));
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 2);
}

/// **VALUE**: Verifies a server that crashes on start fails the launch immediately.
///
/// **WHY THIS MATTERS**: A bad config makes the server exit at once. Waiting out the
/// whole probe budget for a dead process wastes minutes per suite.
///
/// **BUG THIS CATCHES**: Would catch if the readiness loop is no longer raced
/// against the process exit.
#[tokio::test]
async fn given_crash_on_start_when_launched_then_fails_fast_with_exit_code() {
    // GIVEN: A process that exits 50ms after spawn, and a long probe budget
    let address = closed_address().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script {
        crash_after: Some(Duration::from_millis(50)),
        ..Script::default()
    });
    let settings = SupervisorSettings::new("kvstore-server", workspace.root())
        .with_probe(harness_core::ReadinessProbe::new(
            Duration::from_secs(1),
            60,
            Duration::from_millis(200),
        ))
        .with_log_sink(LogSink::Null);
    let supervisor = Supervisor::new(launcher.clone(), settings);

    // WHEN: Launching
    let started = Instant::now();
    let result = supervisor
        .launch(None, LaunchOptions::new().with_port(address.port()), true)
        .await;

    // THEN: ProcessExited with the exit code, long before the budget
    match result {
        Err(CoreError::Readiness(ReadinessError::ProcessExited { code, .. })) => {
            assert_eq!(code, Some(1));
        }
        Err(other) => panic!("Expected ProcessExited, got {other:?}"),
        Ok(_) => panic!("Expected ProcessExited, got a ready handle"),
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    // AND: A dead process is not killed again
    assert_eq!(launcher.kills(), 0);
}

/// **VALUE**: Verifies a missing template aborts before anything is spawned.
#[tokio::test]
async fn given_missing_template_when_launched_then_provision_error_and_no_spawn() {
    // GIVEN: A template path that does not exist
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);
    let missing = workspace.root().join("absent.conf");

    // WHEN: Launching
    let result = supervisor
        .launch(Some(&missing), LaunchOptions::new(), true)
        .await;

    // THEN: Provision error, launcher never called
    assert!(matches!(result, Err(CoreError::Provision(_))));
    assert_eq!(launcher.launches(), 0);
}

/// **VALUE**: Verifies invalid flags are rejected before provisioning.
///
/// **BUG THIS CATCHES**: Would catch a launch that leaves a generated config behind
/// after failing flag validation.
#[tokio::test]
async fn given_port_in_free_form_flags_when_launched_then_validation_error_and_no_files() {
    // GIVEN: `port` passed as a free-form flag
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);

    // WHEN: Launching
    let result = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_flag("port", "7777"),
            true,
        )
        .await;

    // THEN: Validation error, nothing generated, nothing spawned
    assert!(matches!(
        result,
        Err(CoreError::Spawn(SpawnError::Validation { .. }))
    ));
    assert_eq!(launcher.launches(), 0);
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 1);
}

/// **VALUE**: Verifies a missing binary is a spawn error with no probing and no leftovers.
///
/// **WHY THIS MATTERS**: The most common CI failure is a server binary that was not
/// built. It must fail instantly, not after the probe budget.
#[tokio::test]
async fn given_missing_binary_when_launched_with_real_launcher_then_spawn_error_fast() {
    // GIVEN: The real launcher pointed at a binary that does not exist
    let workspace = Workspace::new();
    let settings = SupervisorSettings::new(
        workspace.root().join("bin").join("kvstore-server"),
        workspace.root(),
    )
    .with_log_sink(LogSink::Null);
    let supervisor = Supervisor::new(harness_core::supervisor::TokioLauncher, settings);

    // WHEN: Launching with the default (slow) probe budget
    let started = Instant::now();
    let result = supervisor
        .launch(Some(&workspace.template), LaunchOptions::new(), true)
        .await;

    // THEN: Spawn error immediately
    assert!(matches!(
        result,
        Err(CoreError::Spawn(SpawnError::Spawn { .. }))
    ));
    assert!(started.elapsed() < Duration::from_secs(2));

    // AND: The provisioned config was discarded
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 1);
}
