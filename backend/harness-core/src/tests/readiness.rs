// Unit tests for readiness probe bounds
// Success paths against a live listener are in integration_tests/readiness.rs

use crate::error::readiness::ReadinessError;
use crate::readiness::{ProbeFailure, ReadinessProbe};

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::TcpListener;

/// Reserve a port and release it so nothing is listening there.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind ephemeral port");
    let address = listener.local_addr().expect("local addr");
    drop(listener);
    address
}

/// **VALUE**: Verifies the per-call timeout can never exceed the probe interval.
///
/// **WHY THIS MATTERS**: A hung connect must not stretch a tick, otherwise the
/// overall budget of attempts x interval no longer holds.
///
/// **BUG THIS CATCHES**: Would catch if the clamp in `ReadinessProbe::new` is removed.
#[test]
fn given_call_timeout_longer_than_interval_when_created_then_clamped() {
    // GIVEN / WHEN: A call timeout longer than the interval
    let probe = ReadinessProbe::new(Duration::from_millis(100), 3, Duration::from_secs(5));

    // THEN: Clamped to the interval
    assert_eq!(probe.call_timeout(), Duration::from_millis(100));
    assert_eq!(probe.budget(), Duration::from_millis(300));
}

/// **VALUE**: Tests that a zero attempt budget still probes once.
///
/// **BUG THIS CATCHES**: Would catch a launch that fails without ever probing.
#[test]
fn given_zero_attempts_when_created_then_probes_once() {
    // GIVEN / WHEN
    let probe = ReadinessProbe::new(Duration::from_millis(10), 0, Duration::from_millis(5));

    // THEN
    assert_eq!(probe.max_attempts(), 1);
}

/// **VALUE**: Verifies the budget saturates instead of overflowing.
///
/// **WHY THIS MATTERS**: Durations come from user config; a huge interval must not
/// panic the harness while computing the budget for its error message.
///
/// **BUG THIS CATCHES**: Would catch a plain `interval * attempts` multiplication.
#[test]
fn given_huge_interval_when_budget_computed_then_saturates() {
    // GIVEN: An interval that overflows when multiplied by the attempts
    let probe = ReadinessProbe::new(Duration::MAX, 12, Duration::from_secs(3));

    // WHEN / THEN
    assert_eq!(probe.budget(), Duration::MAX);
}

/// **VALUE**: Verifies probe exhaustion against a port with nothing listening.
///
/// **WHY THIS MATTERS**: A server that never binds must fail the launch within the
/// attempt budget rather than hang the whole suite.
///
/// **BUG THIS CATCHES**: Would catch an unbounded retry loop or a loop that ignores
/// `max_attempts`.
#[tokio::test]
async fn given_nothing_listening_when_waiting_then_times_out_within_budget() {
    // GIVEN: A closed port and a small budget
    let address = closed_port().await;
    let probe = ReadinessProbe::new(Duration::from_millis(50), 4, Duration::from_millis(40));

    // WHEN: Waiting for readiness
    let started = Instant::now();
    let result = probe.wait_until_ready(address).await;
    let elapsed = started.elapsed();

    // THEN: Timeout error after all attempts, within budget plus slack
    match result {
        Err(ReadinessError::Timeout { attempts, .. }) => assert_eq!(attempts, 4),
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert!(
        elapsed < probe.budget() + Duration::from_millis(500),
        "Probe took {elapsed:?}, budget {:?}",
        probe.budget()
    );
}

/// **VALUE**: Tests that a listener that accepts but never answers is bounded.
///
/// **WHY THIS MATTERS**: A half-started server can accept TCP connections before it
/// serves requests. Without the per-call timeout one attempt could block forever.
///
/// **BUG THIS CATCHES**: Would catch if `probe_once` stops wrapping the round trip
/// in `tokio::time::timeout`.
#[tokio::test]
async fn given_silent_listener_when_probed_once_then_times_out() {
    // GIVEN: A listener that accepts connections and never replies
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind listener");
    let address = listener.local_addr().expect("local addr");
    let accept_task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    let probe = ReadinessProbe::new(Duration::from_millis(200), 1, Duration::from_millis(100));

    // WHEN: Probing once
    let started = Instant::now();
    let result = probe.probe_once(address).await;

    // THEN: TimedOut after roughly the call timeout
    assert!(matches!(result, Err(ProbeFailure::TimedOut(_))), "Got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(2));

    accept_task.abort();
}
