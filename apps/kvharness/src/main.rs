use kvharness::cli::{CONFIG_ENV, LOG_DIR_ENV, resolve_config_source, resolve_log_dir, run};
use kvharness::logger::initialize as LoggerInitialize;

use std::env::{args_os, var_os};
use std::fs::create_dir_all;
use std::process::ExitCode;

use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is the normal case
    let _ = dotenvy::dotenv();

    let log_dir = resolve_log_dir(var_os(LOG_DIR_ENV));
    if let Err(e) = create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
        return ExitCode::FAILURE;
    }

    if let Err(e) = LoggerInitialize(&log_dir) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let source = resolve_config_source(args_os().nth(1), var_os(CONFIG_ENV));
    info!("kvharness starting with config {}", source.path().display());

    match run(&source).await {
        Ok(()) => {
            info!("kvharness finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
