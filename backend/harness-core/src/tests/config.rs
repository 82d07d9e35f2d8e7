// Unit tests for config parsing and validation

use crate::DEFAULT_PORT;
use crate::config::HarnessConfig;
use crate::error::config::ConfigError;

use std::path::{Path, PathBuf};
use std::time::Duration;

const ORIGIN: &str = "kvharness.toml";

/// **VALUE**: Verifies an empty file yields the documented defaults.
///
/// **WHY THIS MATTERS**: Suites rely on defaults for the probe budget and shutdown
/// timeout; a silent change would make launches flaky or closes hang longer.
///
/// **BUG THIS CATCHES**: Would catch a missing `#[serde(default)]` on any section.
#[test]
fn given_empty_text_when_parsed_then_uses_defaults() {
    // GIVEN: Empty configuration text
    // WHEN: Parsing
    let config = HarnessConfig::parse("", Path::new(ORIGIN)).expect("empty config parses");

    // THEN: Defaults are applied
    assert_eq!(config.server.port, DEFAULT_PORT);
    assert!(config.server.delete_on_close);
    assert_eq!(config.probe.interval, Duration::from_secs(10));
    assert_eq!(config.probe.attempts, 12);
    assert_eq!(config.shutdown.timeout, Duration::from_secs(30));
    assert_eq!(config.client.dial_timeout, Duration::from_secs(10));
    assert_eq!(config.client.response_timeout, Duration::from_secs(30));
    assert_eq!(config.client.max_retries, None);
}

/// **VALUE**: Tests humantime durations and pass-through flags.
///
/// **WHY THIS MATTERS**: Durations are the knobs people tune when a server starts
/// slowly on CI; they must accept the human-readable form.
///
/// **BUG THIS CATCHES**: Would catch if the duration deserializer is bypassed or
/// the flags table is dropped.
#[test]
fn given_full_text_when_parsed_then_reads_every_section() {
    // GIVEN: A config with all sections
    let text = r#"
        [server]
        binary = "bin/kvstore-server"
        template = "kvstore.conf"
        port = 7777
        delete_on_close = false
        log_file = "server.log"

        [server.flags]
        databases = "3"

        [probe]
        interval = "250ms"
        attempts = 4
        call_timeout = "100ms"

        [shutdown]
        timeout = "1m 30s"

        [client]
        dial_timeout = "2s"
        response_timeout = "5s"
        max_retries = 3
    "#;

    // WHEN: Parsing
    let config = HarnessConfig::parse(text, Path::new(ORIGIN)).expect("config parses");

    // THEN: Every value is read
    assert_eq!(config.server.port, 7777);
    assert!(!config.server.delete_on_close);
    assert_eq!(config.server.template, Some(PathBuf::from("kvstore.conf")));
    assert_eq!(config.server.log_file, Some(PathBuf::from("server.log")));
    assert_eq!(config.server.flags.get("databases").map(String::as_str), Some("3"));
    assert_eq!(config.probe.interval, Duration::from_millis(250));
    assert_eq!(config.probe.attempts, 4);
    assert_eq!(config.probe.call_timeout, Duration::from_millis(100));
    assert_eq!(config.shutdown.timeout, Duration::from_secs(90));
    assert_eq!(config.client.max_retries, Some(3));
}

/// **VALUE**: Tests that a malformed duration is a parse error, not a panic.
///
/// **BUG THIS CATCHES**: Would catch an `unwrap()` in the duration deserializer.
#[test]
fn given_bad_duration_when_parsed_then_returns_parse_error() {
    // GIVEN: An unparseable duration
    let text = "[shutdown]\ntimeout = \"soon\"\n";

    // WHEN: Parsing
    let result = HarnessConfig::parse(text, Path::new(ORIGIN));

    // THEN: ParseError naming the origin
    match result {
        Err(ConfigError::ParseError { path, reason, .. }) => {
            assert_eq!(path, PathBuf::from(ORIGIN));
            assert!(reason.contains("soon"), "Reason should quote the value: {reason}");
        }
        other => panic!("Expected ParseError, got {other:?}"),
    }
}

/// **VALUE**: Tests that a zero attempt budget is rejected.
///
/// **WHY THIS MATTERS**: Zero attempts would fail every launch without ever probing.
///
/// **BUG THIS CATCHES**: Would catch if `validate()` stops checking the probe section.
#[test]
fn given_zero_attempts_when_validated_then_returns_validation_error() {
    // GIVEN: A config with no probe attempts
    let config =
        HarnessConfig::parse("[probe]\nattempts = 0\n", Path::new(ORIGIN)).expect("parses");

    // WHEN: Validating
    let result = config.validate();

    // THEN: Validation error mentioning the field
    match result {
        Err(ConfigError::ValidationError { reason, .. }) => {
            assert!(reason.contains("probe.attempts"));
        }
        other => panic!("Expected ValidationError, got {other:?}"),
    }
}

/// **VALUE**: Tests the work directory fallback chain.
///
/// **BUG THIS CATCHES**: Would catch if generated files land in the cwd when a
/// template directory is known.
#[test]
fn given_template_without_work_dir_when_work_dir_called_then_uses_template_dir() {
    // GIVEN: Only a template path
    let config = HarnessConfig::parse(
        "[server]\ntemplate = \"suite/kvstore.conf\"\n",
        Path::new(ORIGIN),
    )
    .expect("parses");

    // WHEN / THEN: Work dir is the template's directory
    assert_eq!(config.work_dir(), PathBuf::from("suite"));

    // AND: Defaults to the current directory without a template
    assert_eq!(HarnessConfig::default().work_dir(), PathBuf::from("."));
}

/// **VALUE**: Tests that relative paths are resolved next to the config file.
///
/// **WHY THIS MATTERS**: The kvharness binary may be started from any directory.
///
/// **BUG THIS CATCHES**: Would catch if a bare binary name (looked up on PATH) is
/// wrongly joined to the config directory.
#[test]
fn given_relative_paths_when_loaded_then_resolved_against_config_dir() {
    // GIVEN: A config file in a temp dir
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(ORIGIN);
    std::fs::write(
        &path,
        "[server]\nbinary = \"bin/kvstore-server\"\ntemplate = \"kvstore.conf\"\n",
    )
    .expect("write config");

    // WHEN: Loading
    let config = HarnessConfig::load(&path).expect("config loads");

    // THEN: Paths with a directory are resolved
    assert_eq!(config.server.binary, dir.path().join("bin/kvstore-server"));
    assert_eq!(config.server.template, Some(dir.path().join("kvstore.conf")));

    // AND: A bare binary name is left for PATH lookup
    std::fs::write(&path, "[server]\nbinary = \"kvstore-server\"\n").expect("rewrite config");
    let config = HarnessConfig::load(&path).expect("config loads");
    assert_eq!(config.server.binary, PathBuf::from("kvstore-server"));
}

/// **VALUE**: Tests that a missing file is a read error.
#[test]
fn given_missing_file_when_loaded_then_returns_read_error() {
    // GIVEN: A path that does not exist
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.toml");

    // WHEN: Loading
    let result = HarnessConfig::load(&path);

    // THEN: ReadError with the path
    assert!(
        matches!(result, Err(ConfigError::ReadError { ref path, .. }) if path.ends_with("absent.toml"))
    );
}
