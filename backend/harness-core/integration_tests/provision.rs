use crate::helpers::{TEMPLATE_TEXT, Workspace};

use harness_core::error::provision::ProvisionError;
use harness_core::provision::{ConfigProvisioner, RunId};

// ============================================================================
// Public API tests for configuration provisioning
// ============================================================================

/// **VALUE**: Verifies the full copy-and-rewrite against a real template file.
///
/// **WHY THIS MATTERS**: This is the file the server actually boots from. Its
/// `db-path` must point into the run's own directory and nothing else may change.
///
/// **BUG THIS CATCHES**: Would catch if the template itself is modified instead of
/// the copy, or if the copy is not written to the work directory.
#[test]
fn given_template_when_materialized_with_run_id_then_copy_points_at_run_directory() {
    // GIVEN: A template containing `db-path ./db`
    let workspace = Workspace::new();
    let provisioner = ConfigProvisioner::new(workspace.root());

    // WHEN: Materializing run 12345
    let run = provisioner
        .materialize(&workspace.template, RunId::from_millis(12345))
        .expect("provisioning succeeds");

    // THEN: The copy embeds the id and rewrites only db-path
    let generated = run.generated_path().expect("generated path");
    assert_eq!(generated, workspace.root().join("kvstore_12345.conf"));
    assert_eq!(
        run.data_directory(),
        Some(workspace.root().join("db_12345").as_path())
    );

    let contents = std::fs::read_to_string(generated).expect("read generated config");
    let expected_db_path = format!(
        "db-path {}",
        workspace.root().join("db_12345").join("db").display()
    );
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(
        lines,
        ["port 9221", expected_db_path.as_str(), "log-dir ./log", "databases 16"]
    );

    // AND: The template is untouched
    let template = std::fs::read_to_string(&workspace.template).expect("read template");
    assert_eq!(template, TEMPLATE_TEXT);

    // AND: The data directory is left for the server to create
    assert!(!workspace.root().join("db_12345").exists());
    assert!(run.owns_artifacts());
}

/// **VALUE**: Verifies that two provisioned runs never share paths.
///
/// **WHY THIS MATTERS**: Suites launch servers back to back; shared paths mean one
/// run's cleanup deletes another run's data.
#[test]
fn given_two_copies_when_provisioned_then_paths_differ() {
    // GIVEN: One template
    let workspace = Workspace::new();
    let provisioner = ConfigProvisioner::new(workspace.root());

    // WHEN: Provisioning twice in quick succession
    let first = provisioner
        .provision(&workspace.template, true)
        .expect("first provision");
    let second = provisioner
        .provision(&workspace.template, true)
        .expect("second provision");

    // THEN: Ids, configs and data directories differ
    assert!(first.run_id() < second.run_id());
    assert_ne!(first.generated_path(), second.generated_path());
    assert_ne!(first.data_directory(), second.data_directory());
    assert!(first.generated_path().expect("path").exists());
    assert!(second.generated_path().expect("path").exists());
}

/// **VALUE**: Verifies that inspection mode uses the template in place and owns nothing.
///
/// **WHY THIS MATTERS**: Cleanup deletes owned artifacts. If the template were
/// treated as owned, closing a server would delete the suite's template.
///
/// **BUG THIS CATCHES**: Would catch if `owns_artifacts` is set without copying.
#[test]
fn given_no_copy_when_provisioned_then_returns_template_and_owns_nothing() {
    // GIVEN: A template
    let workspace = Workspace::new();
    let provisioner = ConfigProvisioner::new(workspace.root());

    // WHEN: Provisioning without copying
    let run = provisioner
        .provision(&workspace.template, false)
        .expect("provision in place");

    // THEN: Template path returned unchanged, nothing to clean
    assert_eq!(run.generated_path(), Some(workspace.template.as_path()));
    assert_eq!(run.data_directory(), None);
    assert!(!run.owns_artifacts());
    assert!(run.artifacts().is_empty());
}

/// **VALUE**: Verifies a missing template is reported and nothing is generated.
#[test]
fn given_missing_template_when_provisioned_then_template_error_and_no_files() {
    // GIVEN: A template path that does not exist
    let workspace = Workspace::new();
    let provisioner = ConfigProvisioner::new(workspace.root());
    let missing = workspace.root().join("absent.conf");

    // WHEN: Provisioning
    let result = provisioner.materialize(&missing, RunId::from_millis(1));

    // THEN: Template error, work dir still only holds the original template
    assert!(matches!(result, Err(ProvisionError::Template { .. })));
    let entries = std::fs::read_dir(workspace.root()).expect("read work dir").count();
    assert_eq!(entries, 1);
}

/// **VALUE**: Verifies a copy into an unwritable location is a copy error.
#[test]
fn given_missing_work_dir_when_provisioned_then_copy_error() {
    // GIVEN: A work dir that does not exist
    let workspace = Workspace::new();
    let provisioner = ConfigProvisioner::new(workspace.root().join("missing").join("dir"));

    // WHEN: Provisioning
    let result = provisioner.provision(&workspace.template, true);

    // THEN: Copy error
    assert!(matches!(result, Err(ProvisionError::Copy { .. })));
}
