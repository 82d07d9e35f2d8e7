//! Logging for the kvharness binary.
//!
//! Provides dual output (stdout with colors + file) with thread-safe initialization.
//!
//! Lines forwarded from the server arrive under [`SERVER_LOG_TARGET`]. They are
//! let through at trace level regardless of the harness level, and printed
//! without a `[file:line]` suffix since the source location would only ever
//! point at the forwarding task.

use crate::error::HarnessAppError;

use common::ErrorLocation;
use harness_core::SERVER_LOG_TARGET;

use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, Record, info, warn};

/// Thread-safe initialization guard.
static INIT_LOGGER_ONCE: Once = Once::new();

/// Tracks if logger initialization was already attempted.
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

/// Log file written inside the directory passed to [`initialize`].
pub const LOG_FILE_NAME: &str = "kvharness.log";

/// Message logged once the dispatch is installed.
const LOGGER_INITIALIZED_MESSAGE_PREFIX: &str = "Logger initialized with level: ";

/// Warning for repeated initialization attempts.
const LOGGER_ALREADY_INITIALIZED_MESSAGE: &str = "Logger already initialized";

/// Harness log level in debug builds.
#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// Harness log level in release builds.
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Level for forwarded server output. The supervisor emits it at trace.
const SERVER_OUTPUT_LEVEL: LevelFilter = LevelFilter::Trace;

/// Initialize the logger with dual output (stdout + file).
///
/// # Arguments
///
/// * `log_dir` - Directory that receives [`LOG_FILE_NAME`]. It must already exist.
///
/// This function is safe to call multiple times - subsequent calls will
/// log a warning and return Ok. The actual initialization runs exactly once.
///
/// # Errors
///
/// Returns an error if the log file cannot be created or the dispatch
/// cannot be installed.
pub fn initialize(log_dir: &Path) -> Result<(), HarnessAppError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("{LOGGER_ALREADY_INITIALIZED_MESSAGE}");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_dir);
        if result.is_ok() {
            info!("{LOGGER_INITIALIZED_MESSAGE_PREFIX}{LOG_LEVEL:?}");
        }
    });

    result
}

#[track_caller]
fn initialize_internal(log_dir: &Path) -> Result<(), HarnessAppError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    // Color configuration for stdout
    let color_configuration = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    // Base dispatch with level filter; server output bypasses the harness level
    let base_dispatch = Dispatch::new()
        .level(LOG_LEVEL)
        .level_for(SERVER_LOG_TARGET, SERVER_OUTPUT_LEVEL);

    // Stdout dispatch (colored)
    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {origin}{message}{suffix}",
                date = format_rfc3339(SystemTime::now()),
                level = color_configuration.color(record.level()),
                origin = origin_prefix(record),
                message = message,
                suffix = source_suffix(record),
            ))
        })
        .chain(stdout());

    // File dispatch (plain text, no colors)
    let file_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {origin}{message}{suffix}",
                date = format_rfc3339(SystemTime::now()),
                level = record.level(),
                origin = origin_prefix(record),
                message = message,
                suffix = source_suffix(record),
            ))
        })
        .chain(
            fern::log_file(&log_file_path).map_err(|e| HarnessAppError::Harness {
                message: format!("Failed to create log file: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?,
        );

    // Apply the configuration
    base_dispatch
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()
        .map_err(|e| HarnessAppError::Harness {
            message: format!("Failed to initialize logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(())
}

/// `true` for lines the supervisor forwarded from the server's own output.
pub(crate) fn is_server_output(record: &Record) -> bool {
    record.target() == SERVER_LOG_TARGET
}

/// Marks forwarded server lines so they stand apart from harness messages.
pub(crate) fn origin_prefix(record: &Record) -> &'static str {
    if is_server_output(record) { "server " } else { "" }
}

/// ` [file:line]` for harness messages, nothing for forwarded server lines.
pub(crate) fn source_suffix(record: &Record) -> String {
    if is_server_output(record) {
        return String::new();
    }
    format!(
        " [{}:{}]",
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0)
    )
}
