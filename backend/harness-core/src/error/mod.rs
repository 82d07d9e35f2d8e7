pub mod client;
pub mod config;
pub mod provision;
pub mod readiness;
pub mod shutdown;
pub mod spawn;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Provision(#[from] provision::ProvisionError),

    #[error(transparent)]
    Spawn(#[from] spawn::SpawnError),

    #[error(transparent)]
    Readiness(#[from] readiness::ReadinessError),

    #[error(transparent)]
    Shutdown(#[from] shutdown::ShutdownError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
