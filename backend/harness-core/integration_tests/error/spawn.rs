use harness_core::error::readiness::ReadinessError;
use harness_core::error::spawn::SpawnError;
use common::ErrorLocation;

use std::error::Error;
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;

/// **VALUE**: Verifies that `SpawnError::Spawn` includes file/line/column location tracking.
///
/// **WHY THIS MATTERS**: A missing or non-executable server binary is the most common
/// setup failure. The error has to point at the launch site.
///
/// **BUG THIS CATCHES**: Would catch if someone removes the location from the Display
/// implementation or drops the boxed source.
#[test]
#[track_caller]
fn given_spawn_error_when_formatted_then_includes_location() {
    // GIVEN: A Spawn error with location
    let io_err = IoError::new(ErrorKind::NotFound, "binary not found");
    let err = SpawnError::Spawn {
        message: "Failed to spawn bin/kvstore-server".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(io_err),
    };

    // WHEN: Formatting the error as string
    let error_string = format!("{}", err);

    // THEN: Should include error type, message, and file location
    assert!(error_string.contains("Spawn Error"));
    assert!(error_string.contains("Failed to spawn bin/kvstore-server"));
    assert!(error_string.contains("spawn.rs"));
    assert!(err.source().is_some());
}

/// **VALUE**: Verifies `SpawnError::Validation` includes location tracking.
#[test]
#[track_caller]
fn given_validation_error_when_formatted_then_includes_location() {
    // GIVEN: A Validation error
    let err = SpawnError::Validation {
        message: "Flag name must not start with '-': --port".to_string(),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Formatting the error as string
    let error_string = format!("{}", err);

    // THEN: Should include error type, message, and file location
    assert!(error_string.contains("Validation Error"));
    assert!(error_string.contains("--port"));
    assert!(error_string.contains("spawn.rs"));
}

/// **VALUE**: Verifies readiness errors report the attempt count and the exit code.
///
/// **WHY THIS MATTERS**: "never became ready" and "crashed on start" need different
/// fixes; the message must tell them apart.
#[test]
#[track_caller]
fn given_readiness_errors_when_formatted_then_distinguishable() {
    // GIVEN: Both readiness failures
    let timeout = ReadinessError::Timeout {
        message: "Server at 127.0.0.1:9221 not ready".to_string(),
        attempts: 12,
        location: ErrorLocation::from(Location::caller()),
    };
    let exited = ReadinessError::ProcessExited {
        message: "Server exited with code Some(1) before becoming ready".to_string(),
        code: Some(1),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN/THEN: Each names its own variant and detail
    assert!(timeout.to_string().contains("Timeout Error"));
    assert!(timeout.to_string().contains("12 attempts"));
    assert!(exited.to_string().contains("Process Exited Error"));
    assert!(exited.to_string().contains("Some(1)"));
}
