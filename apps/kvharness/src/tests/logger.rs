// Unit tests for logger initialization and line formatting
// The global logger can only be installed once per process, so everything
// that touches it lives in a single serial test.

use crate::logger::{initialize, origin_prefix, source_suffix};

use harness_core::SERVER_LOG_TARGET;
use log::{Level, Record};

use std::path::PathBuf;

use serial_test::serial;

/// **VALUE**: Verifies an unusable log directory is an error, and a later call does not panic.
///
/// **WHY THIS MATTERS**: The binary reports logger failures on stderr and exits. A panic
/// from fern or from installing a second global logger would hide the reason.
///
/// **BUG THIS CATCHES**: Would catch if `fern::log_file()` is unwrapped, or if the
/// Once/AtomicBool guard is removed and the second call tries to install again.
#[test]
#[serial]
fn given_invalid_log_dir_when_initialized_then_error_and_second_call_ok() {
    // GIVEN: A path that can never be a directory
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN: Initializing with it
    let first = initialize(&invalid_dir);

    // THEN: A Harness error naming the log file
    let err = first.expect_err("Should return error for invalid log directory");
    let err_string = format!("{:?}", err);
    assert!(
        err_string.contains("Harness"),
        "Error should be HarnessAppError::Harness variant"
    );
    assert!(err.to_string().contains("log file"));

    // AND: A second call is a warning, not a panic
    let temp_dir = tempfile::tempdir().expect("tempdir");
    assert!(initialize(temp_dir.path()).is_ok());
}

/// **VALUE**: Verifies forwarded server lines are printed without a source location.
///
/// **WHY THIS MATTERS**: Every forwarded line comes from the same forwarding task, so
/// a `[file:line]` suffix on them is noise that hides the server's own text.
///
/// **BUG THIS CATCHES**: Would catch if the server target is misspelled in either the
/// supervisor or the logger, which would format server lines like harness messages.
#[test]
fn given_server_target_when_formatted_then_prefixed_and_no_source_suffix() {
    // GIVEN: A record under the server output target
    let args = format_args!("stdout (PID: Some(1)): ready");
    let record = Record::builder()
        .args(args)
        .level(Level::Trace)
        .target(SERVER_LOG_TARGET)
        .file(Some("process.rs"))
        .line(Some(128))
        .build();

    // WHEN/THEN: Marked as server output, no location
    assert_eq!(origin_prefix(&record), "server ");
    assert_eq!(source_suffix(&record), "");
}

/// **VALUE**: Verifies harness messages keep their `[file:line]` suffix.
#[test]
fn given_harness_target_when_formatted_then_source_suffix_kept() {
    // GIVEN: A record from the harness itself
    let args = format_args!("Server ready");
    let record = Record::builder()
        .args(args)
        .level(Level::Info)
        .target("harness_core::supervisor")
        .file(Some("supervisor/mod.rs"))
        .line(Some(42))
        .build();

    // WHEN/THEN: No prefix, location appended
    assert_eq!(origin_prefix(&record), "");
    assert_eq!(source_suffix(&record), " [supervisor/mod.rs:42]");
}

/// **VALUE**: Verifies a record without location info still formats.
#[test]
fn given_record_without_location_when_formatted_then_placeholders_used() {
    let args = format_args!("no location");
    let record = Record::builder()
        .args(args)
        .level(Level::Warn)
        .target("kvharness")
        .build();

    assert_eq!(source_suffix(&record), " [unknown:0]");
}
