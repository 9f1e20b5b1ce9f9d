// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Integration tests for the task state machine: compile/skip/rerun
//! behavior (S1), missing inputs (S2), duplicate outputs (S3), and
//! `--force` (S4).

use std::sync::{Arc, Mutex};
use std::collections::HashSet;

use hancho::config::Config;
use hancho::job::JobPool;
use hancho::task::{Task, TaskOutcome, TaskState};
use tokio_util::sync::CancellationToken;

fn engine_path(dir: &std::path::Path) -> std::path::PathBuf {
    let p = dir.join("engine");
    std::fs::write(&p, b"x").unwrap();
    p
}

fn registry() -> Arc<Mutex<HashSet<std::path::PathBuf>>> {
    Arc::new(Mutex::new(HashSet::new()))
}

/// S1 – first run executes the command; a second run with no edits skips it.
#[tokio::test]
async fn unchanged_inputs_are_skipped_on_rerun() {
    if cfg!(windows) {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_path(dir.path());
    let src = dir.path().join("main.cpp");
    std::fs::write(&src, "int main() {}").unwrap();
    let out = dir.path().join("main.o");

    let cfg = Arc::new(Config::new(None));
    cfg.set("task_dir", dir.path().to_string_lossy().into_owned());
    cfg.set("in_src", src.to_string_lossy().into_owned());
    cfg.set("out_obj", out.to_string_lossy().into_owned());
    cfg.set("command", format!("touch {}", out.display()));

    let jobs = JobPool::new(1);
    let cancel = CancellationToken::new();

    let mut first = Task::declare("compile", Arc::clone(&cfg), Vec::new(), engine.clone());
    let outcome = first.run(&jobs, &cancel, &registry()).await.unwrap();
    assert!(matches!(*outcome, TaskOutcome::Finished { .. }));

    let mut second = Task::declare("compile", cfg, Vec::new(), engine);
    let outcome = second.run(&jobs, &cancel, &registry()).await.unwrap();
    assert!(matches!(*outcome, TaskOutcome::Skipped { .. }));
}

/// S2 – a missing input file breaks the task and cancels its dependents.
#[tokio::test]
async fn missing_input_breaks_task_and_cancels_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_path(dir.path());

    let cfg = Arc::new(Config::new(None));
    cfg.set("task_dir", dir.path().to_string_lossy().into_owned());
    cfg.set("in_src", dir.path().join("does_not_exist.cpp").to_string_lossy().into_owned());
    cfg.set("out_obj", dir.path().join("main.o").to_string_lossy().into_owned());
    cfg.set("command", "echo unreachable");

    let jobs = JobPool::new(1);
    let cancel = CancellationToken::new();

    let mut broken = Task::declare("compile", cfg, Vec::new(), engine.clone());
    let promise = broken.promise();
    let result = broken.run(&jobs, &cancel, &registry()).await;
    assert!(result.is_err());
    assert_eq!(broken.state(), TaskState::Broken);

    let dep_cfg = Arc::new(Config::new(None));
    dep_cfg.set("task_dir", dir.path().to_string_lossy().into_owned());
    let mut dependent = Task::declare("link", dep_cfg, vec![promise], engine);
    let outcome = dependent.run(&jobs, &cancel, &registry()).await.unwrap();
    assert!(matches!(*outcome, TaskOutcome::Cancelled));
}

/// S3 – two tasks claiming the same output path: the second is broken.
#[tokio::test]
async fn duplicate_output_breaks_the_second_task() {
    if cfg!(windows) {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_path(dir.path());
    let out = dir.path().join("out.bin");

    let cfg_a = Arc::new(Config::new(None));
    cfg_a.set("task_dir", dir.path().to_string_lossy().into_owned());
    cfg_a.set("command", "true");
    cfg_a.set("out_obj", out.to_string_lossy().into_owned());
    let cfg_b = Arc::new(Config::new(None));
    cfg_b.set("task_dir", dir.path().to_string_lossy().into_owned());
    cfg_b.set("command", "true");
    cfg_b.set("out_obj", out.to_string_lossy().into_owned());

    let shared = registry();
    let jobs = JobPool::new(1);
    let cancel = CancellationToken::new();

    let mut a = Task::declare("first", cfg_a, Vec::new(), engine.clone());
    let mut b = Task::declare("second", cfg_b, Vec::new(), engine);

    a.run(&jobs, &cancel, &shared).await.unwrap();
    let result = b.run(&jobs, &cancel, &shared).await;
    assert!(result.is_err());
    assert_eq!(b.state(), TaskState::Broken);
}

/// S4 – `force` reruns a task even though nothing changed.
#[tokio::test]
async fn force_reruns_an_up_to_date_task() {
    if cfg!(windows) {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_path(dir.path());
    let src = dir.path().join("main.cpp");
    std::fs::write(&src, "int main() {}").unwrap();
    let out = dir.path().join("main.o");

    let cfg = Arc::new(Config::new(None));
    cfg.set("task_dir", dir.path().to_string_lossy().into_owned());
    cfg.set("in_src", src.to_string_lossy().into_owned());
    cfg.set("out_obj", out.to_string_lossy().into_owned());
    cfg.set("command", format!("touch {}", out.display()));

    let jobs = JobPool::new(1);
    let cancel = CancellationToken::new();

    let mut first = Task::declare("compile", Arc::clone(&cfg), Vec::new(), engine.clone());
    first.run(&jobs, &cancel, &registry()).await.unwrap();

    cfg.set("force", true);
    let mut forced = Task::declare("compile", cfg, Vec::new(), engine);
    let outcome = forced.run(&jobs, &cancel, &registry()).await.unwrap();
    assert!(matches!(*outcome, TaskOutcome::Finished { .. }));
}

/// S5 – a depfile dependency newer than the output forces a rerun.
#[tokio::test]
async fn depfile_dependency_triggers_rerun() {
    if cfg!(windows) {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_path(dir.path());
    let src = dir.path().join("main.cpp");
    let header_a = dir.path().join("a.h");
    let header_b = dir.path().join("b.h");
    std::fs::write(&src, "x").unwrap();
    std::fs::write(&header_a, "x").unwrap();
    std::fs::write(&header_b, "x").unwrap();
    let out = dir.path().join("main.o");
    let depfile = dir.path().join("main.d");
    std::fs::write(
        &depfile,
        format!(
            "main.o: {} {} \\\n  {}\n",
            src.display(),
            header_a.display(),
            header_b.display()
        ),
    )
    .unwrap();

    let cfg = Arc::new(Config::new(None));
    cfg.set("task_dir", dir.path().to_string_lossy().into_owned());
    cfg.set("in_src", src.to_string_lossy().into_owned());
    cfg.set("out_obj", out.to_string_lossy().into_owned());
    cfg.set("in_depfile", depfile.to_string_lossy().into_owned());
    cfg.set("command", format!("touch {}", out.display()));

    let jobs = JobPool::new(1);
    let cancel = CancellationToken::new();

    let mut first = Task::declare("compile", Arc::clone(&cfg), Vec::new(), engine.clone());
    first.run(&jobs, &cancel, &registry()).await.unwrap();

    // A depfile-listed header that's newer than the output should trigger
    // a rerun even though the direct `in` source didn't change.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    std::fs::write(&header_b, "changed").unwrap();

    let mut second = Task::declare("compile", cfg, Vec::new(), engine);
    let outcome = second.run(&jobs, &cancel, &registry()).await.unwrap();
    assert!(matches!(*outcome, TaskOutcome::Finished { .. }));
}
