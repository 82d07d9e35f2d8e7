use common::ErrorLocation;

use std::io::Error as IoError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ReadinessError {
    #[error("Timeout Error: {message} after {attempts} attempts {location}")]
    Timeout {
        message: String,
        attempts: u32,
        location: ErrorLocation,
    },

    #[error("Process Exited Error: {message} {location}")]
    ProcessExited {
        message: String,
        code: Option<i32>,
        location: ErrorLocation,
    },

    /// Waiting on the child failed; it may still be running.
    #[error("Wait Error: {message} {location}")]
    Wait {
        message: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },
}
