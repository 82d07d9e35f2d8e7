//! Harness configuration loaded from a TOML file.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! that launches `bin/kvstore-server` on the default port. Durations are
//! written the `humantime` way (`"10s"`, `"250ms"`, `"1m 30s"`).

pub mod duration;

use crate::{DEFAULT_PORT, DEFAULT_SERVER_BINARY};
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_PROBE_ATTEMPTS: u32 = 12;
const DEFAULT_PROBE_CALL_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    pub template: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_delete_on_close")]
    pub delete_on_close: bool,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            template: None,
            work_dir: None,
            port: default_port(),
            delete_on_close: default_delete_on_close(),
            log_file: None,
            flags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_interval", deserialize_with = "duration::deserialize")]
    pub interval: Duration,
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    #[serde(
        default = "default_probe_call_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub call_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: default_probe_interval(),
            attempts: default_probe_attempts(),
            call_timeout: default_probe_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ShutdownConfig {
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: default_shutdown_timeout(),
        }
    }
}

/// Settings handed to every [`crate::ServerClient`].
///
/// `max_retries: None` retries connection attempts without limit.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(
        default = "default_dial_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub dial_timeout: Duration,
    #[serde(
        default = "default_response_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub response_timeout: Duration,
    pub max_retries: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout: default_dial_timeout(),
            response_timeout: default_response_timeout(),
            max_retries: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HarnessConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_binary() -> PathBuf {
    PathBuf::from(DEFAULT_SERVER_BINARY)
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_delete_on_close() -> bool {
    true
}
fn default_probe_interval() -> Duration {
    DEFAULT_PROBE_INTERVAL
}
fn default_probe_attempts() -> u32 {
    DEFAULT_PROBE_ATTEMPTS
}
fn default_probe_call_timeout() -> Duration {
    DEFAULT_PROBE_CALL_TIMEOUT
}
fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}
fn default_dial_timeout() -> Duration {
    DEFAULT_DIAL_TIMEOUT
}
fn default_response_timeout() -> Duration {
    DEFAULT_RESPONSE_TIMEOUT
}

// ============================================
// IMPLEMENTATION
// ============================================

impl HarnessConfig {
    /// Load, resolve and validate a configuration file.
    ///
    /// Relative paths inside the file are resolved against the directory
    /// containing it, so a suite can ship its config next to its template.
    #[track_caller]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading harness config from {}", path.display());

        let text = read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config = Self::parse(&text, path)?;

        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }

        config.validate()?;

        info!("Loaded harness config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text without touching the filesystem.
    ///
    /// `origin` is only used to label errors.
    #[track_caller]
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    #[track_caller]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.probe.attempts == 0, "probe.attempts must be at least 1"),
            (self.probe.interval.is_zero(), "probe.interval must be non-zero"),
            (
                self.probe.call_timeout.is_zero(),
                "probe.call_timeout must be non-zero",
            ),
            (
                self.shutdown.timeout.is_zero(),
                "shutdown.timeout must be non-zero",
            ),
            (
                self.client.dial_timeout.is_zero(),
                "client.dial_timeout must be non-zero",
            ),
            (
                self.client.response_timeout.is_zero(),
                "client.response_timeout must be non-zero",
            ),
            (self.server.port == 0, "server.port must be non-zero"),
        ];

        if let Some((_, reason)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: (*reason).to_string(),
            });
        }

        Ok(())
    }

    /// Directory that receives generated configs and data directories.
    ///
    /// Falls back to the template's directory, then the current directory.
    pub fn work_dir(&self) -> PathBuf {
        self.server
            .work_dir
            .clone()
            .or_else(|| {
                self.server
                    .template
                    .as_deref()
                    .and_then(Path::parent)
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        // A bare binary name is looked up on PATH, not next to the config.
        let binary_has_dir = self
            .server
            .binary
            .parent()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if binary_has_dir {
            resolve(&mut self.server.binary);
        }

        for path in [
            &mut self.server.template,
            &mut self.server.work_dir,
            &mut self.server.log_file,
        ]
        .into_iter()
        .flatten()
        {
            resolve(path);
        }
    }
}
