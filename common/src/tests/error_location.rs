use crate::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies that `ErrorLocation::from()` captures the call site.
///
/// **WHY THIS MATTERS**: Every harness error carries a location. If capture breaks,
/// a failed launch or close cannot be traced back to the step that produced it.
///
/// **BUG THIS CATCHES**: Would catch if `Location::caller()` stops being propagated
/// or if the file/column fields are left empty.
#[test]
#[track_caller]
fn given_location_caller_when_error_location_created_then_captures_file_and_column() {
    // GIVEN: Current caller location
    // WHEN: Creating ErrorLocation from caller
    let location = ErrorLocation::from(Location::caller());

    // THEN: Should capture file and column
    assert!(
        location.file.contains("error_location.rs"),
        "Should capture file path"
    );
    assert!(location.line > 0, "Should capture line number");
    assert!(location.column > 0, "Should capture column number");
}

/// **VALUE**: Verifies the bracketed `[file:line:column]` rendering.
///
/// **WHY THIS MATTERS**: Shutdown failures are logged prominently because they mean
/// a leaked process or directory. The location suffix is what points at the cause.
///
/// **BUG THIS CATCHES**: Would catch a Display change that drops brackets or fields.
#[test]
fn given_error_location_when_displayed_then_renders_bracketed_triplet() {
    // GIVEN: A fixed location
    let location = ErrorLocation {
        file: "supervisor/shutdown.rs",
        line: 42,
        column: 7,
    };

    // WHEN: Rendering it
    let rendered = location.to_string();

    // THEN: Should be bracketed file:line:column
    assert_eq!(rendered, "[supervisor/shutdown.rs:42:7]");
}
