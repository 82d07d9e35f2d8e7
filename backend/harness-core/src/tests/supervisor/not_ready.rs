// Unit tests for the errors launch builds when a server never becomes ready

use crate::error::readiness::ReadinessError;
use crate::supervisor::process::ProcessExit;
use crate::supervisor::{exited_before_ready, lost_track};

use std::io::{Error as IoError, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr};

fn address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 9221))
}

/// **VALUE**: Verifies `exited_before_ready()` records the location of its caller.
///
/// **WHY THIS MATTERS**: The location is what points a developer at the launch step
/// that observed the early exit. A location inside the helper says nothing.
///
/// **BUG THIS CATCHES**: Would catch if `#[track_caller]` is removed from the helper.
#[test]
fn given_early_exit_when_error_built_then_location_is_caller() {
    // GIVEN / WHEN: The error built on a known line
    let (err, line) = (exited_before_ready(address(), ProcessExit { code: Some(3) }), line!());

    // THEN: Exit code kept, location points here
    match err {
        ReadinessError::ProcessExited { code, location, .. } => {
            assert_eq!(code, Some(3));
            assert!(location.file.contains("not_ready.rs"), "Got {location}");
            assert_eq!(location.line, line);
        }
        other => panic!("Expected ProcessExited, got {other:?}"),
    }
}

/// **VALUE**: Verifies a failed wait is not reported as an exit.
///
/// **WHY THIS MATTERS**: A failed wait says nothing about whether the child is gone.
/// Reporting it as an exit would skip the kill and clean up under a live server.
#[test]
fn given_wait_failure_when_error_built_then_wait_variant_with_source() {
    // GIVEN / WHEN
    let (err, line) = (
        lost_track(address(), IoError::new(ErrorKind::Other, "wait failed")), line!(),
    );

    // THEN
    match err {
        ReadinessError::Wait { location, source, .. } => {
            assert_eq!(source.kind(), ErrorKind::Other);
            assert!(location.file.contains("not_ready.rs"));
            assert_eq!(location.line, line);
        }
        other => panic!("Expected Wait, got {other:?}"),
    }
}
