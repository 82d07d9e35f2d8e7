//! Process control behind a small capability interface.
//!
//! The supervisor only ever launches, signals, waits for and kills its
//! child. [`ProcessLauncher`] and [`ManagedProcess`] capture exactly that,
//! so readiness and cleanup logic can run against scripted doubles as well
//! as the real [`TokioLauncher`].

use crate::SERVER_LOG_TARGET;
use crate::error::spawn::SpawnError;

use common::ErrorLocation;

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::SocketAddr;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, trace};
use sysinfo::{Pid, Process, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;

/// How a child left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Where the child's stdout and stderr go.
///
/// Each supervisor carries its own sink; nothing is redirected process-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogSink {
    /// Append both streams to this file.
    File(PathBuf),
    /// Forward each line to the `log` facade at trace level, under
    /// [`SERVER_LOG_TARGET`](crate::SERVER_LOG_TARGET).
    #[default]
    Log,
    /// Discard output.
    Null,
}

/// Fully resolved command line for one launch.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub address: SocketAddr,
    pub log_sink: LogSink,
}

/// A running child the supervisor exclusively owns.
pub trait ManagedProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Ask the process to shut down cleanly (SIGINT).
    fn signal(&mut self) -> IoResult<()>;

    /// Resolve once the process has exited. Must be cancel-safe: the
    /// supervisor drops this future when a timeout wins the race.
    fn wait(&mut self) -> impl Future<Output = IoResult<ProcessExit>> + Send;

    /// Terminate without giving the process a say and reap it.
    fn kill(&mut self) -> impl Future<Output = IoResult<()>> + Send;
}

pub trait ProcessLauncher: Send + Sync {
    type Process: ManagedProcess;

    fn launch(&self, command: &LaunchCommand) -> Result<Self::Process, SpawnError>;
}

/// Launches real child processes on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

pub struct TokioProcess {
    child: TokioChild,
    pid: Option<u32>,
}

pub(crate) fn build_spawn_command(command: &LaunchCommand) -> TokioCommand {
    let mut cmd = TokioCommand::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

#[track_caller]
fn open_log_file(path: &Path) -> Result<(Stdio, Stdio), SpawnError> {
    let open = || -> IoResult<(File, File)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let clone = file.try_clone()?;
        Ok((file, clone))
    };

    let (out, err) = open().map_err(|e| SpawnError::Spawn {
        message: format!("Failed to open server log {}: {e}", path.display()),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })?;

    Ok((Stdio::from(out), Stdio::from(err)))
}

fn forward_lines<R>(reader: R, stream: &'static str, pid: Option<u32>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    TokioSpawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            trace!(target: SERVER_LOG_TARGET, "{stream} (PID: {pid:?}): {line}");
        }
    });
}

impl ProcessLauncher for TokioLauncher {
    type Process = TokioProcess;

    #[track_caller]
    fn launch(&self, command: &LaunchCommand) -> Result<TokioProcess, SpawnError> {
        let mut cmd = build_spawn_command(command);

        match &command.log_sink {
            LogSink::File(path) => {
                let (out, err) = open_log_file(path)?;
                cmd.stdout(out).stderr(err);
            }
            LogSink::Log => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            LogSink::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        debug!(
            "Spawning {} with args {:?}",
            command.program.display(),
            command.args
        );

        let mut child = cmd.spawn().map_err(|e| SpawnError::Spawn {
            message: format!("Failed to spawn {}: {e}", command.program.display()),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, "stdout", pid);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, "stderr", pid);
        }

        info!(
            "Spawned {} (PID: {pid:?}) for {}",
            command.program.display(),
            command.address
        );

        Ok(TokioProcess { child, pid })
    }
}

pub(crate) fn with_process<F, R>(pid: u32, f: F) -> Option<R>
where
    F: FnOnce(&Process) -> R,
{
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    sys.process(pid).map(f)
}

/// Deliver SIGINT to `pid`.
pub(crate) fn interrupt_pid(pid: u32) -> IoResult<()> {
    match with_process(pid, |p| p.kill_with(Signal::Interrupt)) {
        None => Err(IoError::new(
            ErrorKind::NotFound,
            format!("process {pid} not found"),
        )),
        Some(None) => Err(IoError::new(
            ErrorKind::Unsupported,
            "SIGINT is not supported on this platform",
        )),
        Some(Some(false)) => Err(IoError::other(format!(
            "failed to deliver SIGINT to process {pid}"
        ))),
        Some(Some(true)) => {
            debug!("Sent SIGINT to PID {pid}");
            Ok(())
        }
    }
}

impl ManagedProcess for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn signal(&mut self) -> IoResult<()> {
        // Already reaped: there is nothing left to signal.
        if let Some(status) = self.child.try_wait()? {
            return Err(IoError::new(
                ErrorKind::NotFound,
                format!("process already exited with {status}"),
            ));
        }

        let pid = self
            .pid
            .ok_or_else(|| IoError::new(ErrorKind::NotFound, "process has no PID"))?;

        interrupt_pid(pid)
    }

    async fn wait(&mut self) -> IoResult<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> IoResult<()> {
        self.child.kill().await
    }
}
