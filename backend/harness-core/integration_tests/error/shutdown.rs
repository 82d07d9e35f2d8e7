use harness_core::error::shutdown::ShutdownError;
use common::ErrorLocation;

use std::error::Error;
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;
use std::path::PathBuf;

/// **VALUE**: Verifies `ShutdownError::Kill` includes location tracking.
///
/// **WHY THIS MATTERS**: A failed kill means a leaked server. The message is what ends
/// up in CI logs, so it has to say where the kill was attempted.
#[test]
#[track_caller]
fn given_kill_error_when_formatted_then_includes_location() {
    // GIVEN: A Kill error
    let err = ShutdownError::Kill {
        message: "Failed to kill server (PID: Some(4242))".to_string(),
        pid: Some(4242),
        location: ErrorLocation::from(Location::caller()),
        source: IoError::new(ErrorKind::PermissionDenied, "operation not permitted"),
    };

    // WHEN: Formatting the error
    let error_string = err.to_string();

    // THEN: Type, message and file location are present
    assert!(error_string.contains("Kill Error"));
    assert!(error_string.contains("4242"));
    assert!(error_string.contains("shutdown.rs"));
    assert!(err.source().is_some());
}

/// **VALUE**: Verifies `ShutdownError::Cleanup` names the artifact that could not be removed.
#[test]
#[track_caller]
fn given_cleanup_error_when_formatted_then_includes_path() {
    // GIVEN: A Cleanup error
    let err = ShutdownError::Cleanup {
        message: "Failed to remove artifact".to_string(),
        path: PathBuf::from("/work/db_7"),
        location: ErrorLocation::from(Location::caller()),
        source: IoError::new(ErrorKind::PermissionDenied, "read-only file system"),
    };

    // WHEN: Formatting the error
    let error_string = err.to_string();

    // THEN: Type and path are present
    assert!(error_string.contains("Cleanup Error"));
    assert!(error_string.contains("/work/db_7"));
    assert!(error_string.contains("shutdown.rs"));
}
