pub mod config;
pub mod error;
pub mod handle;
pub mod provision;
pub mod readiness;
pub mod supervisor;

#[cfg(test)]
mod tests;

pub const SERVER_BINARY_NAME: &str = "kvstore-server";
pub const SERVER_BIN_DIR: &str = "bin";
pub const DEFAULT_SERVER_BINARY: &str =
    const_format::concatcp!(SERVER_BIN_DIR, "/", SERVER_BINARY_NAME);
pub const SERVER_URL_SCHEME: &str = "redis://";
pub const DEFAULT_PORT: u16 = 9221;

/// `log` target carrying lines the server writes to stdout and stderr.
pub const SERVER_LOG_TARGET: &str = "kvstore_server";

pub use config::HarnessConfig;
pub use handle::{ServerClient, ServerHandle};
pub use provision::{ConfigProvisioner, RunConfig, RunId};
pub use readiness::ReadinessProbe;
pub use supervisor::{LaunchOptions, LogSink, Supervisor};
