//! Launching and supervising the server under test.
//!
//! [`Supervisor::launch`] provisions a configuration, starts the binary and
//! blocks until the readiness probe confirms the server answers writes. The
//! returned [`ServerHandle`] owns the process and drives its shutdown.

pub mod process;
pub mod shutdown;

pub use process::{
    LaunchCommand, LogSink, ManagedProcess, ProcessExit, ProcessLauncher, TokioLauncher,
    TokioProcess,
};
pub use shutdown::{LifecycleState, ShutdownOutcome};

use crate::config::{ClientConfig, HarnessConfig, ShutdownConfig};
use crate::error::CoreError;
use crate::error::readiness::ReadinessError;
use crate::error::shutdown::ShutdownError;
use crate::error::spawn::SpawnError;
use crate::handle::ServerHandle;
use crate::provision::{ConfigProvisioner, RunConfig};
use crate::readiness::ReadinessProbe;
use crate::DEFAULT_PORT;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Error as IoError;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};

const PORT_FLAG: &str = "port";
const FLAG_PREFIX: &str = "--";

/// Flags passed to the server on its command line.
///
/// `port` is typed because the harness probes it. Everything else is a
/// free-form `--<name> <value>` pass-through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    port: Option<u16>,
    flags: BTreeMap<String, String>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }

    /// Render `--port` followed by `base` flags overridden by this set's flags.
    #[track_caller]
    pub fn to_args(&self, base: &BTreeMap<String, String>) -> Result<Vec<OsString>, SpawnError> {
        let mut merged = base.clone();
        merged.extend(self.flags.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut args = Vec::with_capacity(merged.len() * 2 + 2);

        if let Some(port) = self.port {
            args.push(OsString::from(format!("{FLAG_PREFIX}{PORT_FLAG}")));
            args.push(OsString::from(port.to_string()));
        }

        for (name, value) in merged {
            if name.is_empty() || name.starts_with('-') || name.contains(char::is_whitespace) {
                return Err(SpawnError::Validation {
                    message: format!("Invalid flag name '{name}'"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            if name == PORT_FLAG {
                return Err(SpawnError::Validation {
                    message: format!(
                        "Flag '{PORT_FLAG}' must be set with LaunchOptions::with_port, got '{value}'"
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            args.push(OsString::from(format!("{FLAG_PREFIX}{name}")));
            args.push(OsString::from(value));
        }

        Ok(args)
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub binary: PathBuf,
    pub work_dir: PathBuf,
    pub default_port: u16,
    pub base_flags: BTreeMap<String, String>,
    pub probe: ReadinessProbe,
    pub shutdown_timeout: Duration,
    pub log_sink: LogSink,
    pub client: ClientConfig,
}

impl SupervisorSettings {
    pub fn new(binary: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            default_port: DEFAULT_PORT,
            base_flags: BTreeMap::new(),
            probe: ReadinessProbe::default(),
            shutdown_timeout: ShutdownConfig::default().timeout,
            log_sink: LogSink::default(),
            client: ClientConfig::default(),
        }
    }

    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_log_sink(mut self, log_sink: LogSink) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }
}

impl From<&HarnessConfig> for SupervisorSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            binary: config.server.binary.clone(),
            work_dir: config.work_dir(),
            default_port: config.server.port,
            base_flags: config.server.flags.clone(),
            probe: ReadinessProbe::from(&config.probe),
            shutdown_timeout: config.shutdown.timeout,
            log_sink: config
                .server
                .log_file
                .clone()
                .map_or(LogSink::Log, LogSink::File),
            client: config.client,
        }
    }
}

pub struct Supervisor<L: ProcessLauncher = TokioLauncher> {
    launcher: L,
    settings: SupervisorSettings,
    provisioner: ConfigProvisioner,
}

impl Supervisor<TokioLauncher> {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(TokioLauncher, SupervisorSettings::from(config))
    }
}

impl<L: ProcessLauncher> Supervisor<L> {
    pub fn new(launcher: L, settings: SupervisorSettings) -> Self {
        let provisioner = ConfigProvisioner::new(settings.work_dir.clone());
        Self {
            launcher,
            settings,
            provisioner,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn provisioner(&self) -> &ConfigProvisioner {
        &self.provisioner
    }

    /// Start the server and block until it is ready.
    ///
    /// With a `template` the server gets a freshly provisioned copy as its
    /// positional config argument. The handle is only returned once a probe
    /// write succeeded. On readiness failure the process is killed and, if
    /// `delete_on_close` is set, its artifacts are removed before the error
    /// is returned. If that kill fails, [`ShutdownError::Kill`] is returned
    /// instead and nothing is removed.
    pub async fn launch(
        &self,
        template: Option<&Path>,
        options: LaunchOptions,
        delete_on_close: bool,
    ) -> Result<ServerHandle<L::Process>, CoreError> {
        let flag_args = options.to_args(&self.settings.base_flags)?;
        let port = options.port().unwrap_or(self.settings.default_port);
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let run_config = match template {
            Some(template) => self.provisioner.provision(template, true)?,
            None => RunConfig::bare(),
        }
        .with_listen_port(port);

        let mut args = Vec::with_capacity(flag_args.len() + 1);
        if let Some(config_path) = run_config.generated_path() {
            args.push(config_path.as_os_str().to_os_string());
        }
        args.extend(flag_args);

        let command = LaunchCommand {
            program: self.settings.binary.clone(),
            args,
            address,
            log_sink: self.settings.log_sink.clone(),
        };

        info!(
            "Launching {} for run {} on {address}",
            command.program.display(),
            run_config.run_id()
        );

        let mut process = match self.launcher.launch(&command) {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to launch server: {e}");
                discard_artifacts(&run_config);
                return Err(e.into());
            }
        };

        let not_ready = tokio::select! {
            ready = self.settings.probe.wait_until_ready(address) => {
                ready.err().map(NotReady::Running)
            }
            exit = process.wait() => Some(match exit {
                Ok(exit) => NotReady::Exited(exited_before_ready(address, exit)),
                Err(e) => NotReady::Running(lost_track(address, e)),
            }),
        };

        if let Some(not_ready) = not_ready {
            let e = match not_ready {
                NotReady::Exited(e) => e,
                NotReady::Running(e) => {
                    // Artifacts stay on disk when the process may have survived.
                    kill_unready(&mut process, address).await?;
                    e
                }
            };

            error!("Server at {address} never became ready: {e}");

            if delete_on_close {
                discard_artifacts(&run_config);
            }

            return Err(e.into());
        }

        info!("Server ready at {address} (PID: {:?})", process.id());

        Ok(ServerHandle::new(
            address,
            process,
            run_config,
            delete_on_close,
            self.settings.shutdown_timeout,
            self.settings.client,
        ))
    }
}

/// Why launch gave up, and whether the child may still be alive.
enum NotReady {
    Exited(ReadinessError),
    Running(ReadinessError),
}

#[track_caller]
pub(crate) fn exited_before_ready(address: SocketAddr, exit: ProcessExit) -> ReadinessError {
    ReadinessError::ProcessExited {
        message: format!(
            "Server for {address} exited with code {:?} before becoming ready",
            exit.code
        ),
        code: exit.code,
        location: ErrorLocation::from(Location::caller()),
    }
}

#[track_caller]
pub(crate) fn lost_track(address: SocketAddr, source: IoError) -> ReadinessError {
    ReadinessError::Wait {
        message: format!(
            "Lost track of server for {address} before it became ready: {source}"
        ),
        location: ErrorLocation::from(Location::caller()),
        source,
    }
}

async fn kill_unready<P: ManagedProcess>(
    process: &mut P,
    address: SocketAddr,
) -> Result<(), ShutdownError> {
    let pid = process.id();
    warn!("Killing server at {address} that never became ready (PID: {pid:?})");

    process.kill().await.map_err(|e| {
        error!("Failed to kill server (PID: {pid:?}), keeping its artifacts: {e}");
        ShutdownError::Kill {
            message: format!(
                "Failed to kill server at {address} that never became ready (PID: {pid:?}): {e}"
            ),
            pid,
            location: ErrorLocation::from(Location::caller()),
            source: e,
        }
    })
}

fn discard_artifacts(run_config: &RunConfig) {
    if let Err(e) = shutdown::remove_artifacts(run_config) {
        warn!("Failed to discard artifacts of run {}: {e}", run_config.run_id());
    }
}
