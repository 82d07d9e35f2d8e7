use crate::error::spawn::SpawnError;
use crate::supervisor::LaunchOptions;

use std::collections::BTreeMap;
use std::ffi::OsString;

fn strings(args: Vec<OsString>) -> Vec<String> {
    args.into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

/// **VALUE**: Verifies the `--<flag> <value>` rendering with the typed port first.
///
/// **WHY THIS MATTERS**: The server parses its overrides from these pairs; a missing
/// `--` prefix or a dropped value shifts every following argument.
///
/// **BUG THIS CATCHES**: Would catch if the port is emitted without its flag or if
/// pass-through flags lose their values.
#[test]
fn given_port_and_flags_when_rendered_then_emits_pairs() {
    // GIVEN: Port plus two flags
    let options = LaunchOptions::new()
        .with_port(7777)
        .with_flag("databases", "3")
        .with_flag("bind", "127.0.0.1");

    // WHEN: Rendering
    let args = strings(options.to_args(&BTreeMap::new()).expect("valid options"));

    // THEN: Port first, then flags in name order
    assert_eq!(
        args,
        ["--port", "7777", "--bind", "127.0.0.1", "--databases", "3"]
    );
}

/// **VALUE**: Tests that per-launch flags override configured base flags.
///
/// **BUG THIS CATCHES**: Would catch if both values are emitted, leaving the
/// server to pick one arbitrarily.
#[test]
fn given_base_flag_and_override_when_rendered_then_override_wins() {
    // GIVEN: A base flag and an override with the same name
    let base = BTreeMap::from([("databases".to_string(), "16".to_string())]);
    let options = LaunchOptions::new().with_flag("databases", "1");

    // WHEN: Rendering
    let args = strings(options.to_args(&base).expect("valid options"));

    // THEN: Only the override remains
    assert_eq!(args, ["--databases", "1"]);
}

/// **VALUE**: Tests that `port` cannot sneak in through the free-form flags.
///
/// **WHY THIS MATTERS**: The probe targets the typed port. A free-form `port` flag
/// would start the server on one port and probe another.
///
/// **BUG THIS CATCHES**: Would catch if the validation is removed.
#[test]
fn given_port_as_free_form_flag_when_rendered_then_validation_error() {
    // GIVEN: Port passed as a string flag
    let options = LaunchOptions::new().with_flag("port", "7777");

    // WHEN: Rendering
    let result = options.to_args(&BTreeMap::new());

    // THEN: Validation error
    assert!(matches!(result, Err(SpawnError::Validation { .. })));
}

/// **VALUE**: Tests that malformed flag names are rejected.
#[test]
fn given_malformed_flag_names_when_rendered_then_validation_error() {
    for name in ["", "--port", "two words"] {
        // GIVEN: A malformed name
        let options = LaunchOptions::new().with_flag(name, "x");

        // WHEN / THEN: Validation error
        assert!(
            matches!(
                options.to_args(&BTreeMap::new()),
                Err(SpawnError::Validation { .. })
            ),
            "Should reject flag name {name:?}"
        );
    }
}
