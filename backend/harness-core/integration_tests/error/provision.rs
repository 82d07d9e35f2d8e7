use harness_core::error::CoreError;
use harness_core::error::provision::ProvisionError;
use common::ErrorLocation;

use std::error::Error;
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;
use std::path::PathBuf;

/// **VALUE**: Verifies `ProvisionError::Copy` names the type, the path and the call site.
///
/// **WHY THIS MATTERS**: A failed copy is usually a full disk or a read-only work dir.
/// The path tells the developer which directory to look at.
///
/// **BUG THIS CATCHES**: Would catch if the path or the location is dropped from the
/// Display implementation.
#[test]
#[track_caller]
fn given_copy_error_when_formatted_then_includes_path_and_location() {
    // GIVEN: A Copy error
    let err = ProvisionError::Copy {
        message: "Failed to copy template".to_string(),
        path: PathBuf::from("/work/kvstore_1.conf"),
        location: ErrorLocation::from(Location::caller()),
        source: IoError::new(ErrorKind::StorageFull, "no space left"),
    };

    // WHEN: Formatting the error
    let error_string = err.to_string();

    // THEN: Type, path, message and file location are present
    assert!(error_string.contains("Copy Error"));
    assert!(error_string.contains("/work/kvstore_1.conf"));
    assert!(error_string.contains("Failed to copy template"));
    assert!(error_string.contains("provision.rs"));
}

/// **VALUE**: Verifies the io error survives as the source through `CoreError`.
///
/// **BUG THIS CATCHES**: Would catch if `#[source]` is removed or `CoreError` stops
/// being transparent, hiding the underlying io error from callers.
#[test]
fn given_template_error_when_wrapped_in_core_error_then_source_preserved() {
    // GIVEN: A Template error wrapped in CoreError
    let err: CoreError = ProvisionError::Template {
        message: "Configuration template is missing".to_string(),
        path: PathBuf::from("kvstore.conf"),
        location: ErrorLocation::from(Location::caller()),
        source: IoError::new(ErrorKind::NotFound, "not a file"),
    }
    .into();

    // WHEN: Walking the source chain
    let source = err.source().expect("source present");

    // THEN: The io error is reachable and Display is unchanged
    let io_err = source
        .downcast_ref::<IoError>()
        .expect("source is an io error");
    assert_eq!(io_err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("Template Error"));
}
