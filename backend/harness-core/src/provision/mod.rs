//! Per-run configuration files.
//!
//! Every launch gets its own copy of the server's configuration template,
//! with the `db-path` directive pointed at a directory nobody else uses.
//! Both names embed a [`RunId`], so concurrent and back-to-back runs never
//! collide on disk.

use crate::DEFAULT_PORT;
use crate::error::provision::ProvisionError;

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::fs::{copy as copy_file, read_to_string, remove_file, write};
use std::io::ErrorKind;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use regex::{Captures, Regex};

const DB_PATH_DIRECTIVE: &str = "db-path";
const DB_PATH_PATTERN: &str = r"(?m)^(?P<indent>[ \t]*)db-path(?P<sep>[ \t]+)(?P<path>\S+)";
const DEFAULT_DB_LEAF: &str = "db";
const DATA_DIR_PREFIX: &str = "db_";
const DEFAULT_CONFIG_EXTENSION: &str = "conf";

static DB_PATH_REGEX: OnceLock<Regex> = OnceLock::new();
static LAST_RUN_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn get_db_path_regex() -> &'static Regex {
    DB_PATH_REGEX.get_or_init(|| Regex::new(DB_PATH_PATTERN).expect("valid regex pattern"))
}

/// Millisecond timestamp naming one run's artifacts.
///
/// [`RunId::next`] never hands out the same value twice within a process:
/// when the clock has not moved since the previous call, the previous id
/// plus one is used instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    pub fn next() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        let previous = match LAST_RUN_ID.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        }) {
            Ok(previous) | Err(previous) => previous,
        };

        Self(now.max(previous.saturating_add(1)))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl Display for RunId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "{}", self.0)
    }
}

/// Everything one server start needs to know about its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    run_id: RunId,
    template_path: Option<PathBuf>,
    generated_path: Option<PathBuf>,
    data_directory: Option<PathBuf>,
    listen_port: u16,
    owns_artifacts: bool,
}

impl RunConfig {
    /// A run with no configuration file at all; the server uses its built-in defaults.
    pub fn bare() -> Self {
        Self {
            run_id: RunId::next(),
            template_path: None,
            generated_path: None,
            data_directory: None,
            listen_port: DEFAULT_PORT,
            owns_artifacts: false,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn template_path(&self) -> Option<&Path> {
        self.template_path.as_deref()
    }

    /// Path handed to the server as its positional config argument.
    pub fn generated_path(&self) -> Option<&Path> {
        self.generated_path.as_deref()
    }

    pub fn data_directory(&self) -> Option<&Path> {
        self.data_directory.as_deref()
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// True when the generated file and data directory were created for this
    /// run and may be deleted by it. A template used in place is never owned.
    pub fn owns_artifacts(&self) -> bool {
        self.owns_artifacts
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Files and directories to delete when the run is cleaned up.
    ///
    /// Data directory first, then the generated config.
    pub fn artifacts(&self) -> Vec<&Path> {
        if !self.owns_artifacts {
            return Vec::new();
        }

        [self.data_directory.as_deref(), self.generated_path.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Materializes configuration templates into a working directory.
#[derive(Debug, Clone)]
pub struct ConfigProvisioner {
    work_dir: PathBuf,
}

impl ConfigProvisioner {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Pick the configuration for a run.
    ///
    /// With `copy` the template is materialized under a fresh [`RunId`].
    /// Without it the template is used in place, which is only meant for
    /// read-only inspection: nothing is generated and nothing will be cleaned.
    #[track_caller]
    pub fn provision(&self, template: &Path, copy: bool) -> Result<RunConfig, ProvisionError> {
        if copy {
            return self.materialize(template, RunId::next());
        }

        debug!("Using template {} in place", template.display());

        Ok(RunConfig {
            run_id: RunId::next(),
            template_path: Some(template.to_path_buf()),
            generated_path: Some(template.to_path_buf()),
            data_directory: None,
            listen_port: DEFAULT_PORT,
            owns_artifacts: false,
        })
    }

    /// Copy `template` into the work dir under `run_id` and rewrite its `db-path`.
    ///
    /// A copy that cannot be rewritten is removed before the error is returned.
    #[track_caller]
    pub fn materialize(
        &self,
        template: &Path,
        run_id: RunId,
    ) -> Result<RunConfig, ProvisionError> {
        if !template.is_file() {
            return Err(ProvisionError::Template {
                message: "Configuration template is missing".to_string(),
                path: template.to_path_buf(),
                location: ErrorLocation::from(Location::caller()),
                source: std::io::Error::new(ErrorKind::NotFound, "not a file"),
            });
        }

        let generated_path = self.generated_path_for(template, run_id);
        let data_directory = self.data_directory_for(run_id);

        if let Err(e) = copy_file(template, &generated_path) {
            discard_partial_copy(&generated_path);
            return Err(ProvisionError::Copy {
                message: format!("Failed to copy template {}: {e}", template.display()),
                path: generated_path,
                location: ErrorLocation::from(Location::caller()),
                source: e,
            });
        }

        if let Err(e) = rewrite_db_path(&generated_path, &data_directory) {
            discard_partial_copy(&generated_path);
            return Err(e);
        }

        info!(
            "Provisioned {} with data directory {}",
            generated_path.display(),
            data_directory.display()
        );

        Ok(RunConfig {
            run_id,
            template_path: Some(template.to_path_buf()),
            generated_path: Some(generated_path),
            data_directory: Some(data_directory),
            listen_port: DEFAULT_PORT,
            owns_artifacts: true,
        })
    }

    pub(crate) fn generated_path_for(&self, template: &Path, run_id: RunId) -> PathBuf {
        let stem = template
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server".to_string());
        let extension = template
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_EXTENSION.to_string());

        self.work_dir.join(format!("{stem}_{run_id}.{extension}"))
    }

    pub(crate) fn data_directory_for(&self, run_id: RunId) -> PathBuf {
        self.work_dir.join(format!("{DATA_DIR_PREFIX}{run_id}"))
    }
}

/// Remove a copy that failed half way. A copy that never got created is fine.
pub(crate) fn discard_partial_copy(path: &Path) {
    match remove_file(path) {
        Ok(()) => debug!("Removed partial config {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial config {}: {e}", path.display()),
    }
}

#[track_caller]
fn rewrite_db_path(config: &Path, data_directory: &Path) -> Result<(), ProvisionError> {
    let text = read_to_string(config).map_err(|e| ProvisionError::Rewrite {
        message: format!("Failed to read copied config: {e}"),
        path: config.to_path_buf(),
        location: ErrorLocation::from(Location::caller()),
        source: e,
    })?;

    let rewritten = rewrite_db_path_text(&text, data_directory);

    write(config, rewritten).map_err(|e| ProvisionError::Rewrite {
        message: format!("Failed to write rewritten config: {e}"),
        path: config.to_path_buf(),
        location: ErrorLocation::from(Location::caller()),
        source: e,
    })
}

/// Point every `db-path` directive below `data_directory`, keeping the
/// last component of the original value (`./db` becomes `<dir>/db`).
///
/// Text without the directive gets one appended.
pub(crate) fn rewrite_db_path_text(text: &str, data_directory: &Path) -> String {
    let re = get_db_path_regex();

    if !re.is_match(text) {
        debug!("Template has no {DB_PATH_DIRECTIVE} directive, appending one");
        let target = data_directory.join(DEFAULT_DB_LEAF);
        let separator = if text.is_empty() || text.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        return format!(
            "{text}{separator}{DB_PATH_DIRECTIVE} {}\n",
            target.display()
        );
    }

    re.replace_all(text, |caps: &Captures<'_>| {
        let leaf = Path::new(&caps["path"])
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_DB_LEAF.to_string());
        let target = data_directory.join(leaf);

        format!(
            "{}{DB_PATH_DIRECTIVE}{}{}",
            &caps["indent"],
            &caps["sep"],
            target.display()
        )
    })
    .into_owned()
}
