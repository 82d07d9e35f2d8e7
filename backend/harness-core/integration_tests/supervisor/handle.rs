use crate::helpers::{
    FakeRespServer, OnSignal, Script, ScriptedLauncher, Workspace, closed_address,
    create_data_directory, scripted_supervisor,
};

use harness_core::ServerClient;
use harness_core::config::ClientConfig;
use harness_core::error::client::ClientError;
use harness_core::error::shutdown::ShutdownError;
use harness_core::supervisor::{LaunchOptions, LifecycleState};

use std::time::{Duration, Instant};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(300);

// ============================================================================
// ServerHandle::close
// ============================================================================

/// **VALUE**: Verifies close with cleanup removes the data directory and the generated config.
///
/// **WHY THIS MATTERS**: Suites launch a server per test. Leftover data directories
/// fill the disk and leak state between runs.
///
/// **BUG THIS CATCHES**: Would catch if cleanup is skipped or only removes one of the
/// two artifacts.
#[tokio::test]
async fn given_delete_on_close_when_closed_then_artifacts_removed() {
    // GIVEN: A launched server that wrote to its data directory
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);
    let handle = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(server.port()),
            true,
        )
        .await
        .expect("launch succeeds");
    let data_directory = handle
        .run_config()
        .data_directory()
        .expect("data dir")
        .to_path_buf();
    let generated = handle
        .run_config()
        .generated_path()
        .expect("generated")
        .to_path_buf();
    create_data_directory(&data_directory);

    // WHEN: Closing
    handle.close().await.expect("close succeeds");

    // THEN: Both artifacts are gone, the template is kept
    assert!(!data_directory.exists());
    assert!(!generated.exists());
    assert!(workspace.template.exists());
    assert_eq!(handle.state().await, LifecycleState::CleanedUp);
    assert!(handle.is_closed());
    assert_eq!(launcher.signals(), 1);
}

/// **VALUE**: Verifies close without cleanup keeps every artifact.
///
/// **WHY THIS MATTERS**: Keeping the data directory is how a failing test is debugged.
#[tokio::test]
async fn given_no_delete_on_close_when_closed_then_artifacts_kept() {
    // GIVEN: A launched server that keeps its artifacts
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let supervisor = scripted_supervisor(
        &workspace,
        ScriptedLauncher::new(Script::default()),
        SHUTDOWN_TIMEOUT,
    );
    let handle = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(server.port()),
            false,
        )
        .await
        .expect("launch succeeds");
    let data_directory = handle
        .run_config()
        .data_directory()
        .expect("data dir")
        .to_path_buf();
    create_data_directory(&data_directory);

    // WHEN: Closing
    handle.close().await.expect("close succeeds");

    // THEN: Everything is still there
    assert!(data_directory.exists());
    assert!(
        handle
            .run_config()
            .generated_path()
            .expect("generated")
            .exists()
    );
    assert_eq!(handle.state().await, LifecycleState::Exited);
}

/// **VALUE**: Verifies a second close is a no-op.
///
/// **BUG THIS CATCHES**: Would catch if a repeated close signals a process that is
/// already gone (possibly a recycled pid) or tries to delete artifacts twice.
#[tokio::test]
async fn given_closed_handle_when_closed_again_then_no_op() {
    // GIVEN: A launched and closed server
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script::default());
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);
    let handle = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(server.port()),
            true,
        )
        .await
        .expect("launch succeeds");
    handle.close().await.expect("first close succeeds");

    // WHEN: Closing again
    let second = handle.close().await;

    // THEN: Ok, and the process was signalled only once
    assert!(second.is_ok());
    assert_eq!(launcher.signals(), 1);
    assert_eq!(launcher.kills(), 0);
}

/// **VALUE**: Verifies close is bounded for a server that ignores the graceful signal.
///
/// **WHY THIS MATTERS**: Teardown must finish even when the server hangs on shutdown.
#[tokio::test]
async fn given_signal_ignored_when_closed_then_killed_within_timeout() {
    // GIVEN: A server that ignores the graceful signal
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script {
        on_signal: OnSignal::Ignore,
        ..Script::default()
    });
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);
    let handle = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(server.port()),
            true,
        )
        .await
        .expect("launch succeeds");

    // WHEN: Closing
    let started = Instant::now();
    handle.close().await.expect("close succeeds");

    // THEN: Done shortly after the shutdown timeout, via kill
    assert!(started.elapsed() < SHUTDOWN_TIMEOUT + Duration::from_secs(1));
    assert_eq!(launcher.kills(), 1);
    assert_eq!(handle.state().await, LifecycleState::CleanedUp);
}

/// **VALUE**: Verifies artifacts are left in place when the process could not be killed.
///
/// **WHY THIS MATTERS**: Deleting a data directory under a live server corrupts it
/// and hides the leak. The caller gets an error instead, and the process stays owned
/// by the handle so dropping the handle is a last chance to reap it.
#[tokio::test]
async fn given_kill_fails_when_closed_then_error_and_artifacts_kept() {
    // GIVEN: A server that ignores the signal and cannot be killed
    let server = FakeRespServer::start().await;
    let workspace = Workspace::new();
    let launcher = ScriptedLauncher::new(Script {
        on_signal: OnSignal::Ignore,
        kill_fails: true,
        ..Script::default()
    });
    let supervisor = scripted_supervisor(&workspace, launcher.clone(), SHUTDOWN_TIMEOUT);
    let handle = supervisor
        .launch(
            Some(&workspace.template),
            LaunchOptions::new().with_port(server.port()),
            true,
        )
        .await
        .expect("launch succeeds");
    let data_directory = handle
        .run_config()
        .data_directory()
        .expect("data dir")
        .to_path_buf();
    create_data_directory(&data_directory);

    // WHEN: Closing
    let result = handle.close().await;

    // THEN: Kill error, nothing deleted
    assert!(matches!(result, Err(ShutdownError::Kill { .. })));
    assert!(data_directory.exists());
    assert!(
        handle
            .run_config()
            .generated_path()
            .expect("generated")
            .exists()
    );
    assert_eq!(handle.state().await, LifecycleState::SignalSent);

    // AND: The process is held until the handle goes away, then released
    assert_eq!(launcher.drops(), 0);
    drop(handle);
    assert_eq!(launcher.drops(), 1);
}

// ============================================================================
// Clients
// ============================================================================

/// **VALUE**: Verifies every call to new_client returns an independent working client.
#[tokio::test]
async fn given_ready_handle_when_clients_created_then_each_connects() {
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

    // WHEN: Creating two clients
    let first = handle.new_client().expect("first client");
    let second = handle.new_client().expect("second client");

    // THEN: Both reach the server
    let mut first_conn = first.connection().await.expect("first connects");
    let mut second_conn = second.connection().await.expect("second connects");
    let _: () = redis::cmd("SET")
        .arg("shared")
        .arg("1")
        .query_async(&mut first_conn)
        .await
        .expect("SET succeeds");
    let value: String = redis::cmd("GET")
        .arg("shared")
        .query_async(&mut second_conn)
        .await
        .expect("GET succeeds");
    assert_eq!(value, "1");

    handle.close().await.expect("close succeeds");
}

/// **VALUE**: Verifies bounded retries give up with the attempt count.
///
/// **BUG THIS CATCHES**: Would catch if `max_retries` is ignored, which would make a
/// client for a dead server retry forever.
#[tokio::test]
async fn given_no_retries_when_connecting_to_closed_port_then_connect_error() {
    // GIVEN: A client for a port nobody listens on, without retries
    let address = closed_address().await;
    let config = ClientConfig {
        dial_timeout: Duration::from_millis(500),
        response_timeout: Duration::from_millis(500),
        max_retries: Some(0),
    };
    let client = ServerClient::open(address, config).expect("client opens");

    // WHEN: Connecting
    let result = client.connection().await;

    // THEN: A connect error after a single attempt
    match result {
        Err(ClientError::Connect { attempts, .. }) => assert_eq!(attempts, 1),
        Err(other) => panic!("Expected Connect error, got {other:?}"),
        Ok(_) => panic!("Expected Connect error, got a connection"),
    }
}
