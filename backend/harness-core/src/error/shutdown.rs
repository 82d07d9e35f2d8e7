use common::ErrorLocation;

use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ShutdownError {
    /// The forced kill failed; the process may still be running.
    #[error("Kill Error: {message} {location}")]
    Kill {
        message: String,
        pid: Option<u32>,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Cleanup Error: {path}: {message} {location}")]
    Cleanup {
        message: String,
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },
}
