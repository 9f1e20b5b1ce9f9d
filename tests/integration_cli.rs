// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Integration tests for CLI parsing, including the unrecognized-flags-
//! become-config-overrides contract.

use hancho::cli::{parse_from, split_overrides};

#[test]
fn recognized_flags_parse_normally() {
    let cli = parse_from(["hancho", "-j", "4", "-n", "--force", "compile"]);
    assert_eq!(cli.jobs, Some(4));
    assert!(cli.dry_run);
    assert!(cli.force);
    assert_eq!(cli.targets, vec!["compile"]);
}

#[test]
fn keep_going_and_trace_flags_are_recognized() {
    let cli = parse_from(["hancho", "-k", "--trace"]);
    assert!(cli.keep_going);
    assert!(cli.trace);
}

#[test]
fn unrecognized_long_flags_are_left_to_split_overrides() {
    let args: Vec<String> = ["hancho", "--arch=x64", "--release", "link"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let (known, overrides) = split_overrides(&args);
    assert_eq!(known, vec!["hancho", "link"]);
    assert_eq!(
        overrides,
        vec![
            ("arch".to_string(), "x64".to_string()),
            ("release".to_string(), "true".to_string()),
        ]
    );
}

#[test]
fn log_level_override_is_recognized_as_a_known_flag() {
    let args: Vec<String> = ["hancho", "--log-level", "3"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let (known, overrides) = split_overrides(&args);
    assert_eq!(known, args);
    assert!(overrides.is_empty());
}
