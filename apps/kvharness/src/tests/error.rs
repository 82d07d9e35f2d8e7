// Unit tests for error module

use crate::error::HarnessAppError;

use common::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies each variant prints its kind, message and call site.
///
/// **WHY THIS MATTERS**: These strings are the last line the binary logs before it
/// exits with a failure code.
#[test]
#[track_caller]
fn given_app_errors_when_formatted_then_include_kind_and_location() {
    // GIVEN: One error of each kind
    let errors = [
        (
            HarnessAppError::Harness {
                message: "Failed to create log file".to_string(),
                location: ErrorLocation::from(Location::caller()),
            },
            "Harness Error",
        ),
        (
            HarnessAppError::Core {
                message: "Spawn Error: binary not found".to_string(),
                location: ErrorLocation::from(Location::caller()),
            },
            "Core Error",
        ),
        (
            HarnessAppError::CloseFailed {
                message: "Kill Error: operation not permitted".to_string(),
                location: ErrorLocation::from(Location::caller()),
            },
            "Close Error",
        ),
    ];

    // WHEN/THEN: Display carries the kind and the file
    for (err, kind) in errors {
        let error_string = err.to_string();
        assert!(error_string.contains(kind), "Missing {kind} in {error_string}");
        assert!(error_string.contains("error.rs"));
    }
}
