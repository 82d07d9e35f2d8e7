use crate::helpers::{
    Events, OnSignal, Script, ScriptedProcess, Workspace, create_data_directory,
};

use harness_core::error::shutdown::ShutdownError;
use harness_core::provision::{ConfigProvisioner, RunConfig, RunId};
use harness_core::supervisor::shutdown::{remove_artifacts, terminate};
use harness_core::supervisor::{LifecycleState, ProcessExit, ShutdownOutcome};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

const GRACE: Duration = Duration::from_secs(30);

fn scripted(script: Script) -> (ScriptedProcess, Arc<Mutex<Events>>) {
    let events = Arc::new(Mutex::new(Events::default()));
    (ScriptedProcess::new(script, Arc::clone(&events)), events)
}

// ============================================================================
// terminate: graceful signal, bounded wait, forced kill
// ============================================================================

/// **VALUE**: Verifies escalation: a server needing 40s is killed once the 30s grace runs out.
///
/// **WHY THIS MATTERS**: A server flushing a large store can take arbitrarily long to
/// honor the signal. The harness must bound teardown instead of hanging the suite.
///
/// **BUG THIS CATCHES**: Would catch a wait without timeout, or a timeout that returns
/// without killing the process.
#[tokio::test(start_paused = true)]
async fn given_slow_exit_when_terminated_then_killed_after_grace() {
    // GIVEN: A process that needs 40s to exit after the signal
    let (mut process, events) = scripted(Script {
        on_signal: OnSignal::ExitAfter(Duration::from_secs(40)),
        ..Script::default()
    });
    let mut state = LifecycleState::Running;

    // WHEN: Terminating with a 30s grace period
    let started = Instant::now();
    let outcome = terminate(&mut process, GRACE, &mut state)
        .await
        .expect("terminate succeeds");
    let elapsed = started.elapsed();

    // THEN: Killed at the grace boundary
    assert_eq!(outcome, ShutdownOutcome::Killed);
    assert_eq!(state, LifecycleState::Killed);
    assert!(elapsed >= GRACE, "Killed too early: {elapsed:?}");
    assert!(elapsed < GRACE + Duration::from_secs(1), "Killed too late: {elapsed:?}");

    // AND: Exactly one signal and one kill
    let events = events.lock().expect("events lock");
    assert_eq!(events.signals, 1);
    assert_eq!(events.kills, 1);
}

/// **VALUE**: Verifies a prompt exit is reported as Exited without any kill.
#[tokio::test(start_paused = true)]
async fn given_prompt_exit_when_terminated_then_exited_without_kill() {
    // GIVEN: A process that exits 2s after the signal
    let (mut process, events) = scripted(Script {
        on_signal: OnSignal::ExitAfter(Duration::from_secs(2)),
        ..Script::default()
    });
    let mut state = LifecycleState::Running;

    // WHEN: Terminating
    let outcome = terminate(&mut process, GRACE, &mut state)
        .await
        .expect("terminate succeeds");

    // THEN: Exited cleanly, never killed
    assert_eq!(outcome, ShutdownOutcome::Exited(ProcessExit { code: Some(0) }));
    assert_eq!(state, LifecycleState::Exited);
    assert_eq!(events.lock().expect("events lock").kills, 0);
}

/// **VALUE**: Verifies a server that ignores the signal is still stopped.
///
/// **BUG THIS CATCHES**: Would catch if escalation depends on the signal having any
/// effect at all.
#[tokio::test(start_paused = true)]
async fn given_ignored_signal_when_terminated_then_killed() {
    // GIVEN: A process that ignores the graceful signal
    let (mut process, events) = scripted(Script {
        on_signal: OnSignal::Ignore,
        ..Script::default()
    });
    let mut state = LifecycleState::Running;

    // WHEN: Terminating
    let outcome = terminate(&mut process, GRACE, &mut state)
        .await
        .expect("terminate succeeds");

    // THEN: Killed
    assert_eq!(outcome, ShutdownOutcome::Killed);
    assert_eq!(state, LifecycleState::Killed);
    assert_eq!(events.lock().expect("events lock").kills, 1);
}

/// **VALUE**: Verifies a failed wait escalates to a kill instead of being trusted as an exit.
#[tokio::test(start_paused = true)]
async fn given_wait_fails_when_terminated_then_killed() {
    // GIVEN: A process whose wait fails
    let (mut process, events) = scripted(Script {
        wait_fails: true,
        ..Script::default()
    });
    let mut state = LifecycleState::Running;

    // WHEN: Terminating
    let outcome = terminate(&mut process, GRACE, &mut state)
        .await
        .expect("terminate succeeds");

    // THEN: Killed
    assert_eq!(outcome, ShutdownOutcome::Killed);
    assert_eq!(state, LifecycleState::Killed);
    assert_eq!(events.lock().expect("events lock").kills, 1);
}

/// **VALUE**: Verifies a failed kill is surfaced and the state does not claim the process is gone.
///
/// **WHY THIS MATTERS**: Callers decide whether cleanup is safe from this result. A
/// process that could not be killed may still be writing to its data directory.
#[tokio::test(start_paused = true)]
async fn given_kill_fails_when_terminated_then_kill_error_and_state_signal_sent() {
    // GIVEN: A process that ignores the signal and refuses to be killed
    let (mut process, _events) = scripted(Script {
        on_signal: OnSignal::Ignore,
        kill_fails: true,
        ..Script::default()
    });
    let mut state = LifecycleState::Running;

    // WHEN: Terminating
    let result = terminate(&mut process, GRACE, &mut state).await;

    // THEN: Kill error carrying the pid
    match result {
        Err(ShutdownError::Kill { pid, .. }) => assert_eq!(pid, Some(4242)),
        other => panic!("Expected Kill error, got {other:?}"),
    }
    assert_eq!(state, LifecycleState::SignalSent);
}

// ============================================================================
// remove_artifacts
// ============================================================================

/// **VALUE**: Verifies both the data directory and the generated config are removed.
#[test]
fn given_owned_artifacts_when_removed_then_both_gone_and_template_kept() {
    // GIVEN: A materialized run whose server created its data directory
    let workspace = Workspace::new();
    let provisioner = ConfigProvisioner::new(workspace.root());
    let run_config = provisioner
        .materialize(&workspace.template, RunId::next())
        .expect("materialize");
    let data_directory = run_config.data_directory().expect("data dir").to_path_buf();
    let generated = run_config.generated_path().expect("generated").to_path_buf();
    create_data_directory(&data_directory);

    // WHEN: Removing artifacts
    remove_artifacts(&run_config).expect("cleanup succeeds");

    // THEN: Both are gone, the template stays
    assert!(!data_directory.exists());
    assert!(!generated.exists());
    assert!(workspace.template.exists());
}

/// **VALUE**: Verifies a data directory the server never created is not an error.
///
/// **BUG THIS CATCHES**: Would catch if NotFound is treated as a cleanup failure,
/// which would fail every run whose server exited before writing anything.
#[test]
fn given_data_directory_never_created_when_removed_then_ok() {
    // GIVEN: A materialized run with no data directory on disk
    let workspace = Workspace::new();
    let run_config = ConfigProvisioner::new(workspace.root())
        .materialize(&workspace.template, RunId::next())
        .expect("materialize");

    // WHEN/THEN: Cleanup succeeds and the config is gone
    remove_artifacts(&run_config).expect("cleanup succeeds");
    assert!(!run_config.generated_path().expect("generated").exists());
}

/// **VALUE**: Verifies a template used in place is never deleted.
///
/// **WHY THIS MATTERS**: Deleting a checked-in template would break every later run.
#[test]
fn given_template_used_in_place_when_removed_then_template_untouched() {
    // GIVEN: A run that uses the template without copying
    let workspace = Workspace::new();
    let run_config = ConfigProvisioner::new(workspace.root())
        .provision(&workspace.template, false)
        .expect("provision");

    // WHEN: Removing artifacts
    remove_artifacts(&run_config).expect("cleanup succeeds");

    // THEN: The template is still there
    assert!(workspace.template.exists());
    assert!(run_config.artifacts().is_empty());
}

/// **VALUE**: Verifies a run without any template owns nothing to clean.
#[test]
fn given_bare_run_when_removed_then_ok() {
    assert!(remove_artifacts(&RunConfig::bare()).is_ok());
}
