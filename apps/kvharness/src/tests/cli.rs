// Unit tests for config source resolution and loading

use crate::cli::{ConfigSource, DEFAULT_CONFIG_FILE, load_config, resolve_config_source, resolve_log_dir};
use crate::error::HarnessAppError;

use harness_core::HarnessConfig;

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// **VALUE**: Verifies the command line argument wins over the environment.
#[test]
fn given_arg_and_env_when_resolved_then_arg_wins() {
    let source = resolve_config_source(
        Some(OsString::from("suite.toml")),
        Some(OsString::from("env.toml")),
    );

    assert_eq!(source, ConfigSource::Explicit(PathBuf::from("suite.toml")));
}

/// **VALUE**: Verifies the environment is used when no argument is given.
#[test]
fn given_only_env_when_resolved_then_env_used() {
    let source = resolve_config_source(None, Some(OsString::from("env.toml")));

    assert_eq!(source, ConfigSource::Explicit(PathBuf::from("env.toml")));
}

/// **VALUE**: Verifies an empty value falls back to the conventional file name.
///
/// **BUG THIS CATCHES**: Would catch `KVHARNESS_CONFIG=` being treated as an explicit
/// empty path, which would fail with a confusing read error.
#[test]
fn given_empty_values_when_resolved_then_default_file() {
    let source = resolve_config_source(None, Some(OsString::new()));

    assert_eq!(
        source,
        ConfigSource::Default(PathBuf::from(DEFAULT_CONFIG_FILE))
    );
    assert_eq!(resolve_log_dir(Some(OsString::new())), PathBuf::from("."));
}

/// **VALUE**: Verifies a missing default config file means built-in defaults.
///
/// **WHY THIS MATTERS**: Running the harness without any config must work out of the box.
#[test]
fn given_missing_default_file_when_loaded_then_defaults() {
    // GIVEN: A default source pointing at a file that does not exist
    let dir = tempfile::tempdir().expect("tempdir");
    let source = ConfigSource::Default(dir.path().join(DEFAULT_CONFIG_FILE));

    // WHEN: Loading
    let config = load_config(&source).expect("defaults");

    // THEN: The built-in defaults apply
    assert_eq!(config, HarnessConfig::default());
}

/// **VALUE**: Verifies a missing explicit config file is an error.
///
/// **BUG THIS CATCHES**: Would catch a typo in `--config` silently running with defaults.
#[test]
fn given_missing_explicit_file_when_loaded_then_core_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = ConfigSource::Explicit(dir.path().join("absent.toml"));

    let result = load_config(&source);

    assert!(matches!(result, Err(HarnessAppError::Core { .. })));
}

/// **VALUE**: Verifies an existing default file is read like an explicit one.
#[test]
fn given_existing_default_file_when_loaded_then_values_applied() {
    // GIVEN: A default config file with a shorter shutdown timeout
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DEFAULT_CONFIG_FILE);
    std::fs::write(&path, "[shutdown]\ntimeout = \"5s\"\n").expect("write config");

    // WHEN: Loading
    let config = load_config(&ConfigSource::Default(path)).expect("config loads");

    // THEN: The file's value wins
    assert_eq!(config.shutdown.timeout, Duration::from_secs(5));
}
