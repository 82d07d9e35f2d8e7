//! Command line wiring: which config to load and how long the server lives.

use crate::error::HarnessAppError;

use harness_core::HarnessConfig;
use harness_core::supervisor::{LaunchOptions, ProcessLauncher, Supervisor};

use common::ErrorLocation;

use std::ffi::OsString;
use std::future::Future;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

pub const CONFIG_ENV: &str = "KVHARNESS_CONFIG";
pub const LOG_DIR_ENV: &str = "KVHARNESS_LOG_DIR";
pub const DEFAULT_CONFIG_FILE: &str = "kvharness.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or in the environment; must exist.
    Explicit(PathBuf),
    /// The conventional file name; defaults apply when it is absent.
    Default(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Default(path) => path,
        }
    }
}

/// The first command line argument wins over the environment.
pub fn resolve_config_source(arg: Option<OsString>, env: Option<OsString>) -> ConfigSource {
    arg.or(env)
        .filter(|value| !value.is_empty())
        .map(|value| ConfigSource::Explicit(PathBuf::from(value)))
        .unwrap_or_else(|| ConfigSource::Default(PathBuf::from(DEFAULT_CONFIG_FILE)))
}

pub fn resolve_log_dir(env: Option<OsString>) -> PathBuf {
    env.filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[track_caller]
pub fn load_config(source: &ConfigSource) -> Result<HarnessConfig, HarnessAppError> {
    if let ConfigSource::Default(path) = source
        && !path.exists()
    {
        debug!("No {} found, using defaults", path.display());
        return Ok(HarnessConfig::default());
    }

    HarnessConfig::load(source.path()).map_err(|e| {
        error!("Failed to load config: {e}");
        HarnessAppError::Core {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    })
}

/// Launch the server, keep it up until `shutdown` resolves, then close it.
pub async fn serve<L, F>(
    supervisor: &Supervisor<L>,
    template: Option<&Path>,
    options: LaunchOptions,
    delete_on_close: bool,
    shutdown: F,
) -> Result<(), HarnessAppError>
where
    L: ProcessLauncher,
    F: Future<Output = ()>,
{
    let handle = supervisor
        .launch(template, options, delete_on_close)
        .await
        .map_err(|e| {
            error!("Failed to launch server: {e}");
            HarnessAppError::Core {
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

    info!(
        "Server ready at {} (PID: {:?})",
        handle.address(),
        handle.pid()
    );
    if let Some(config) = handle.run_config().generated_path() {
        info!("Server config: {}", config.display());
    }

    shutdown.await;

    handle.close().await.map_err(|e| {
        error!("Failed to close server at {}: {e}", handle.address());
        HarnessAppError::CloseFailed {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    })
}

/// Load the configuration and serve until Ctrl-C.
pub async fn run(source: &ConfigSource) -> Result<(), HarnessAppError> {
    let config = load_config(source)?;
    let supervisor = Supervisor::from_config(&config);
    let options = LaunchOptions::new().with_port(config.server.port);

    serve(
        &supervisor,
        config.server.template.as_deref(),
        options,
        config.server.delete_on_close,
        async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl-C, shutting down: {e}"),
            }
        },
    )
    .await
}
