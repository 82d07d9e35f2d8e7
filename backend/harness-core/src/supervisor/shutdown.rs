//! Graceful-then-forced shutdown and artifact cleanup.
//!
//! `Running -> SignalSent -> {Exited | Killed} -> CleanedUp`
//!
//! Cleanup only ever runs after the exit race has concluded, so a data
//! directory is never deleted underneath a live server.

use crate::error::shutdown::ShutdownError;
use crate::provision::RunConfig;
use crate::supervisor::process::{ManagedProcess, ProcessExit};

use common::ErrorLocation;

use std::fs::{remove_dir_all, remove_file};
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    SignalSent,
    Exited,
    Killed,
    CleanedUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Exited(ProcessExit),
    Killed,
}

/// Signal the process, give it `grace` to exit, then kill it.
///
/// Returns [`ShutdownError::Kill`] only when the forced kill itself failed,
/// in which case the process may still be running and `state` stays at
/// `SignalSent`.
pub async fn terminate<P: ManagedProcess>(
    process: &mut P,
    grace: Duration,
    state: &mut LifecycleState,
) -> Result<ShutdownOutcome, ShutdownError> {
    let pid = process.id();

    match process.signal() {
        Ok(()) => debug!("Sent graceful signal to server (PID: {pid:?})"),
        Err(e) => warn!("Failed to send graceful signal to server (PID: {pid:?}): {e}"),
    }
    *state = LifecycleState::SignalSent;

    match timeout(grace, process.wait()).await {
        Ok(Ok(exit)) => {
            *state = LifecycleState::Exited;
            if exit.success() {
                info!("Server (PID: {pid:?}) exited cleanly");
            } else {
                info!("Server (PID: {pid:?}) exited with code {:?}", exit.code);
            }
            return Ok(ShutdownOutcome::Exited(exit));
        }
        Ok(Err(e)) => {
            warn!("Waiting for server (PID: {pid:?}) failed: {e}, killing it");
        }
        Err(_) => {
            warn!("Server (PID: {pid:?}) did not exit within {grace:?}, killing it");
        }
    }

    if let Err(e) = process.kill().await {
        error!("Failed to kill server (PID: {pid:?}), it may still be running: {e}");
        return Err(ShutdownError::Kill {
            message: format!("Failed to kill server (PID: {pid:?}): {e}"),
            pid,
            location: ErrorLocation::from(Location::caller()),
            source: e,
        });
    }

    *state = LifecycleState::Killed;
    info!("Server (PID: {pid:?}) killed");
    Ok(ShutdownOutcome::Killed)
}

/// Delete the data directory, then the generated config.
///
/// Both removals are attempted; the first failure is returned. Paths that
/// are already gone count as removed, since the server creates its data
/// directory lazily.
pub fn remove_artifacts(run_config: &RunConfig) -> Result<(), ShutdownError> {
    let mut first_error = None;

    if !run_config.owns_artifacts() {
        debug!("Run {} owns no artifacts", run_config.run_id());
        return Ok(());
    }

    if let Some(dir) = run_config.data_directory()
        && let Err(e) = remove_path(dir, |p| remove_dir_all(p))
    {
        first_error = Some(e);
    }

    if let Some(file) = run_config.generated_path()
        && let Err(e) = remove_path(file, |p| remove_file(p))
        && first_error.is_none()
    {
        first_error = Some(e);
    }

    first_error.map_or(Ok(()), Err)
}

fn remove_path<F>(path: &Path, remove: F) -> Result<(), ShutdownError>
where
    F: FnOnce(&Path) -> Result<(), IoError>,
{
    match remove(path) {
        Ok(()) => {
            info!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} already absent", path.display());
            Ok(())
        }
        Err(e) => {
            error!("Failed to remove {}: {e}", path.display());
            Err(ShutdownError::Cleanup {
                message: format!("Failed to remove artifact: {e}"),
                path: path.to_path_buf(),
                location: ErrorLocation::from(Location::caller()),
                source: e,
            })
        }
    }
}
