use crate::helpers::{FakeRespServer, fast_probe};

use std::time::{Duration, Instant};

/// **VALUE**: Verifies the probe succeeds on the first attempt against a live server.
///
/// **WHY THIS MATTERS**: A ready server must not cost a full tick of latency per launch.
///
/// **BUG THIS CATCHES**: Would catch a loop that sleeps before its first attempt.
#[tokio::test]
async fn given_live_server_when_waiting_then_ready_without_waiting_a_tick() {
    // GIVEN: A server that is already listening
    let server = FakeRespServer::start().await;
    let probe = fast_probe();

    // WHEN: Waiting for readiness
    let started = Instant::now();
    let result = probe.wait_until_ready(server.address()).await;

    // THEN: Ready, well inside one interval, after SET and DEL
    assert!(result.is_ok(), "Probe failed: {result:?}");
    assert!(started.elapsed() < probe.interval() * 5);
    assert!(server.commands() >= 2, "Probe should SET then DEL");
}

/// **VALUE**: Verifies the probe keeps polling until a slow server starts listening.
///
/// **WHY THIS MATTERS**: Server startup time varies; the probe exists to absorb it
/// instead of failing with "connection refused" right after spawn.
///
/// **BUG THIS CATCHES**: Would catch a probe that gives up after the first refusal.
#[tokio::test]
async fn given_slow_server_when_waiting_then_retries_until_ready() {
    // GIVEN: A server that only binds after 200ms
    let server = FakeRespServer::start_after(Duration::from_millis(200)).await;
    let probe = fast_probe();

    // WHEN: Waiting for readiness
    let started = Instant::now();
    let result = probe.wait_until_ready(server.address()).await;

    // THEN: Ready once the server is up
    assert!(result.is_ok(), "Probe failed: {result:?}");
    assert!(started.elapsed() >= Duration::from_millis(200));
}

/// **VALUE**: Verifies the probe leaves no sentinel key behind.
///
/// **WHY THIS MATTERS**: Black-box tests count keys (`DBSIZE`, `KEYS *`); a stray
/// probe key would make them fail for reasons unrelated to the server.
#[tokio::test]
async fn given_ready_server_when_probed_then_sentinel_key_removed() {
    // GIVEN: A live server and a probe
    let server = FakeRespServer::start().await;
    let probe = fast_probe();

    // WHEN: Probing once
    probe
        .probe_once(server.address())
        .await
        .expect("probe succeeds");

    // THEN: The sentinel key is gone
    let client = redis::Client::open(format!("redis://{}", server.address())).expect("client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connect");
    let value: Option<String> = redis::cmd("GET")
        .arg("__kvharness_probe__")
        .query_async(&mut conn)
        .await
        .expect("GET succeeds");
    assert_eq!(value, None);
}
