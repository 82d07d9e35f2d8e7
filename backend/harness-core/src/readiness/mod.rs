//! Readiness probing for a freshly spawned server.
//!
//! Startup time of the server under test varies (storage is opened,
//! listeners are bound), so launch polls on a fixed tick with a hard
//! attempt budget instead of racing the first client against the bind.

use crate::config::ProbeConfig;
use crate::error::readiness::ReadinessError;

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::time::Duration;

use log::{debug, info, trace, warn};
use redis::{Client, RedisError};
use tokio::time::{MissedTickBehavior, interval, timeout};

const PROBE_KEY: &str = "__kvharness_probe__";
const PROBE_VALUE: &str = "ready";
const PROBE_REPLY_OK: &str = "OK";
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Why a single attempt did not count as ready.
#[derive(Debug)]
pub enum ProbeFailure {
    Redis(RedisError),
    UnexpectedReply(String),
    TimedOut(Duration),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::Redis(e) => write!(f, "{e}"),
            ProbeFailure::UnexpectedReply(reply) => write!(f, "unexpected reply '{reply}'"),
            ProbeFailure::TimedOut(after) => write!(f, "no reply within {after:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessProbe {
    interval: Duration,
    max_attempts: u32,
    call_timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::from(&ProbeConfig::default())
    }
}

impl From<&ProbeConfig> for ReadinessProbe {
    fn from(config: &ProbeConfig) -> Self {
        Self::new(config.interval, config.attempts, config.call_timeout)
    }
}

impl ReadinessProbe {
    /// `call_timeout` is clamped to `interval` so one hung attempt can never
    /// stretch a tick. A zero attempt budget is treated as one attempt.
    pub fn new(interval: Duration, max_attempts: u32, call_timeout: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            call_timeout: call_timeout.min(interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Upper bound on how long [`ReadinessProbe::wait_until_ready`] can block.
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Poll `address` until a write round trip succeeds or the budget runs out.
    ///
    /// The first attempt runs immediately; later ones run on each tick.
    pub async fn wait_until_ready(&self, address: SocketAddr) -> Result<(), ReadinessError> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "Waiting for {address} to become ready ({} attempts every {:?})",
            self.max_attempts, self.interval
        );

        for attempt in 1..=self.max_attempts {
            ticker.tick().await;

            match self.probe_once(address).await {
                Ok(()) => {
                    info!("Server at {address} is ready after {attempt} attempt(s)");
                    return Ok(());
                }
                Err(failure) => {
                    if attempt < self.max_attempts {
                        debug!(
                            "Server at {address} not ready ({failure}), attempt {attempt}/{}",
                            self.max_attempts
                        );
                    } else {
                        warn!("Server at {address} not ready ({failure}), giving up");
                    }
                }
            }
        }

        Err(ReadinessError::Timeout {
            message: format!(
                "Server at {address} did not become ready within {:?}",
                self.budget()
            ),
            attempts: self.max_attempts,
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// One bounded attempt: fresh connection, `SET` expecting `OK`, then `DEL`
    /// so the keyspace the tests see is left untouched.
    pub async fn probe_once(&self, address: SocketAddr) -> Result<(), ProbeFailure> {
        match timeout(self.call_timeout, round_trip(address)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::TimedOut(self.call_timeout)),
        }
    }
}

async fn round_trip(address: SocketAddr) -> Result<(), ProbeFailure> {
    let client = Client::open(format!("{}{address}", crate::SERVER_URL_SCHEME))
        .map_err(ProbeFailure::Redis)?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(ProbeFailure::Redis)?;

    let reply: String = redis::cmd("SET")
        .arg(PROBE_KEY)
        .arg(PROBE_VALUE)
        .query_async(&mut conn)
        .await
        .map_err(ProbeFailure::Redis)?;

    if reply != PROBE_REPLY_OK {
        return Err(ProbeFailure::UnexpectedReply(reply));
    }

    let removed: i64 = redis::cmd("DEL")
        .arg(PROBE_KEY)
        .query_async(&mut conn)
        .await
        .map_err(ProbeFailure::Redis)?;
    trace!("Probe key removed from {address} ({removed})");

    Ok(())
}
