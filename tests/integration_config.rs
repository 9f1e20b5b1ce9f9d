// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Integration tests for prototypal config inheritance and macro expansion
//! (S6 – expansion fixed-point).

use std::sync::Arc;

use hancho::config::Config;
use hancho::value::Value;

#[test]
fn child_config_shadows_parent_without_mutating_it() {
    let root = Arc::new(Config::root());
    root.set("build_tag", "release");

    let child = Arc::new(root.fork());
    child.set("build_tag", "debug");

    assert_eq!(child.get("build_tag").unwrap().as_str(), Some("debug"));
    assert_eq!(root.get("build_tag").unwrap().as_str(), Some("release"));
}

#[test]
fn grandchild_sees_values_set_on_any_ancestor() {
    let root = Arc::new(Config::root());
    root.set("root_dir", "/proj");

    let mid = Arc::new(root.fork());
    mid.set("repo_name", "proj");

    let leaf = Arc::new(mid.fork());
    leaf.set("task_name", "compile");

    assert_eq!(leaf.get("root_dir").unwrap().as_str(), Some("/proj"));
    assert_eq!(leaf.get("repo_name").unwrap().as_str(), Some("proj"));
    assert_eq!(leaf.get("task_name").unwrap().as_str(), Some("compile"));
}

/// S6 – expansion fixed-point: ternary, dotted string concatenation, and
/// multi-macro strings all resolve in one `get_expanded` call.
#[test]
fn expansion_resolves_ternaries_and_nested_macros() {
    let cfg = Arc::new(Config::new(None));
    cfg.set("build_type", "debug");
    cfg.set("cpp_std", "-std=c++20");
    cfg.set(
        "gcc_opt",
        "{'-O3' if build_type == 'release' else '-g -O0'} -MMD",
    );
    cfg.set("toolchain", "x86_64-linux-gnu");
    cfg.set("command", "{toolchain}-g++ {cpp_std} {gcc_opt}");

    let expanded = cfg.get_expanded("command").unwrap().unwrap();
    assert_eq!(
        expanded.as_str(),
        Some("x86_64-linux-gnu-g++ -std=c++20 -g -O0 -MMD")
    );
}

#[test]
fn expansion_leaves_unresolved_macros_as_literal_text() {
    let cfg = Arc::new(Config::new(None));
    cfg.set("desc", "building {target}");

    let expanded = cfg.get_expanded("desc").unwrap().unwrap();
    assert_eq!(expanded.as_str(), Some("building {target}"));
}

#[test]
fn require_expanded_errors_on_missing_key() {
    let cfg = Config::new(None);
    assert!(cfg.require_expanded("no_such_key").is_err());
}

#[test]
fn root_config_carries_the_documented_defaults() {
    let root = Config::root();
    assert!(matches!(root.get("desc"), Some(Value::Str(_))));
    assert!(matches!(root.get("task_dir"), Some(Value::Str(_))));
    assert!(matches!(root.get("build_dir"), Some(Value::Str(_))));
    assert!(matches!(root.get("build_root"), Some(Value::Str(_))));
}
