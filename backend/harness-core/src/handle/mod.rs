//! The object test suites hold on to.
//!
//! A [`ServerHandle`] only exists for a server that already answered the
//! readiness probe, so clients handed out by it can be used straight away.

use crate::SERVER_URL_SCHEME;
use crate::config::ClientConfig;
use crate::error::client::ClientError;
use crate::error::shutdown::ShutdownError;
use crate::provision::RunConfig;
use crate::supervisor::process::{ManagedProcess, TokioProcess};
use crate::supervisor::shutdown::{LifecycleState, remove_artifacts, terminate};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, error, info, warn};
use redis::Client;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tokio::time::sleep as TokioSleep;

struct HandleInner<P> {
    process: Option<P>,
    state: LifecycleState,
}

pub struct ServerHandle<P: ManagedProcess = TokioProcess> {
    address: SocketAddr,
    pid: Option<u32>,
    run_config: RunConfig,
    delete_on_close: bool,
    shutdown_timeout: Duration,
    client_config: ClientConfig,
    closed: AtomicBool,
    inner: Mutex<HandleInner<P>>,
}

impl<P: ManagedProcess> ServerHandle<P> {
    pub(crate) fn new(
        address: SocketAddr,
        process: P,
        run_config: RunConfig,
        delete_on_close: bool,
        shutdown_timeout: Duration,
        client_config: ClientConfig,
    ) -> Self {
        Self {
            address,
            pid: process.id(),
            run_config,
            delete_on_close,
            shutdown_timeout,
            client_config,
            closed: AtomicBool::new(false),
            inner: Mutex::new(HandleInner {
                process: Some(process),
                state: LifecycleState::Running,
            }),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn delete_on_close(&self) -> bool {
        self.delete_on_close
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    /// A fresh client for this server.
    #[track_caller]
    pub fn new_client(&self) -> Result<ServerClient, ClientError> {
        ServerClient::open(self.address, self.client_config)
    }

    /// Stop the server and, if requested, delete its artifacts.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    /// When the forced kill fails the artifacts are left alone and the
    /// error is returned, since the process may still be using them.
    pub async fn close(&self) -> Result<(), ShutdownError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("Server at {} already closed", self.address);
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        let Some(mut process) = inner.process.take() else {
            return Ok(());
        };

        info!("Closing server at {} (PID: {:?})", self.address, self.pid);

        if let Err(e) = terminate(&mut process, self.shutdown_timeout, &mut inner.state).await {
            error!(
                "Server at {} (PID: {:?}) may be leaked: {e}",
                self.address, self.pid
            );
            // Held until the handle drops so `kill_on_drop` gets another go at it.
            inner.process = Some(process);
            return Err(e);
        }

        if self.delete_on_close {
            debug!("Cleaning artifacts of run {}", self.run_config.run_id());
            remove_artifacts(&self.run_config).inspect_err(|e| {
                error!("Cleanup after closing {} failed: {e}", self.address);
            })?;
            inner.state = LifecycleState::CleanedUp;
        }

        info!("Closed server at {}", self.address);
        Ok(())
    }
}

/// Client for a ready server.
///
/// Dial and response timeouts are bounded; dialling is retried with
/// exponential backoff up to `max_retries` (without limit when unset).
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: Client,
    address: SocketAddr,
    config: ClientConfig,
}

impl ServerClient {
    #[track_caller]
    pub fn open(address: SocketAddr, config: ClientConfig) -> Result<Self, ClientError> {
        let client =
            Client::open(format!("{SERVER_URL_SCHEME}{address}")).map_err(|e| ClientError::Open {
                message: format!("Failed to create client for {address}: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })?;

        Ok(Self {
            client,
            address,
            config,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying `redis` client, for callers that manage connections themselves.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub async fn connection(&self) -> Result<MultiplexedConnection, ClientError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let err = match self
                .client
                .get_multiplexed_async_connection_with_timeouts(
                    self.config.response_timeout,
                    self.config.dial_timeout,
                )
                .await
            {
                Ok(conn) => return Ok(conn),
                Err(e) => e,
            };

            if self
                .config
                .max_retries
                .is_some_and(|max_retries| attempts > max_retries)
            {
                return Err(ClientError::Connect {
                    message: format!("Failed to connect to {}: {err}", self.address),
                    attempts,
                    location: ErrorLocation::from(Location::caller()),
                    source: err,
                });
            }

            let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
            debug!(
                "Connecting to {} failed ({err}), retrying after {delay:?}",
                self.address
            );
            TokioSleep(delay).await;
        }
    }
}
