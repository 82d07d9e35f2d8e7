use common::ErrorLocation;

use thiserror::Error;

/// Errors surfaced by the `kvharness` binary.
///
/// Core errors are flattened to their message here; the structured error
/// has already been logged where it was raised.
#[derive(Debug, Error)]
pub enum HarnessAppError {
    /// Error from this App
    #[error("Harness Error: {message} {location}")]
    Harness {
        message: String,
        location: ErrorLocation,
    },

    /// Error from harness-core operations (config, launch, etc.)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Server failed to stop or clean up
    #[error("Close Error: {message} {location}")]
    CloseFailed {
        message: String,
        location: ErrorLocation,
    },
}
