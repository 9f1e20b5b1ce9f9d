// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The task state machine.
//!
//! ```text
//! Declared -> Queued -> Started -> AwaitingInputs -> TaskInit
//!    -> { Finished | Skipped }                  (up to date)
//!    -> AwaitingJobs -> RunningCommands -> { Finished | Failed }
//! any state -> Cancelled   (dependency failed, or run cancelled)
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{FsError, HanchoError, Result, TaskError};
use crate::expand::expand_required;
use crate::job::JobPool;
use crate::paths;
use crate::process::CommandBuilder;
use crate::staleness::{self, DepfileFormat, StalenessInputs};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Declared,
    Queued,
    Started,
    AwaitingInputs,
    TaskInit,
    AwaitingJobs,
    RunningCommands,
    Finished,
    Skipped,
    Broken,
    Failed,
    Cancelled,
}

/// The terminal result of a task, shared with any task that depends on it.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Finished { out_files: Vec<PathBuf> },
    Skipped { out_files: Vec<PathBuf> },
    Failed { message: String },
    Cancelled,
}

impl TaskOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Skipped { .. })
    }

    #[must_use]
    pub fn out_files(&self) -> &[PathBuf] {
        match self {
            Self::Finished { out_files } | Self::Skipped { out_files } => out_files,
            _ => &[],
        }
    }
}

/// Tracks every output path claimed by a task that has reached `TaskInit`,
/// shared by every task in a run so the second task to declare the same
/// `out` path is caught as a name collision rather than silently clobbering
/// the first one's output.
pub type OutputRegistry = Arc<Mutex<HashSet<PathBuf>>>;

/// A handle other tasks await to learn this task's outcome. Cloneable so
/// many dependents can watch the same task.
#[derive(Clone)]
pub struct Promise {
    rx: watch::Receiver<Option<Arc<TaskOutcome>>>,
}

impl Promise {
    /// Waits for the producing task to reach a terminal state.
    pub async fn await_outcome(&mut self) -> Arc<TaskOutcome> {
        loop {
            if let Some(outcome) = self.rx.borrow().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return Arc::new(TaskOutcome::Cancelled);
            }
        }
    }
}

struct PromiseSender {
    tx: watch::Sender<Option<Arc<TaskOutcome>>>,
}

impl PromiseSender {
    fn new() -> (Self, Promise) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, Promise { rx })
    }

    fn resolve(&self, outcome: TaskOutcome) {
        let _ = self.tx.send(Some(Arc::new(outcome)));
    }
}

/// A single build task: a forked config plus its dependency promises.
pub struct Task {
    name: String,
    config: Arc<Config>,
    inputs: Vec<Promise>,
    engine_path: PathBuf,
    state: TaskState,
    sender: PromiseSender,
    promise: Promise,
}

impl Task {
    /// Declares a new task from `config` (already forked and populated with
    /// this task's own fields: `command`, `in`, `out`, etc. by the loader)
    /// and its dependency promises.
    #[must_use]
    pub fn declare(name: impl Into<String>, config: Arc<Config>, inputs: Vec<Promise>, engine_path: PathBuf) -> Self {
        let (sender, promise) = PromiseSender::new();
        Self {
            name: name.into(),
            config,
            inputs,
            engine_path,
            state: TaskState::Declared,
            sender,
            promise,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// A promise dependents can clone to await this task's outcome.
    #[must_use]
    pub fn promise(&self) -> Promise {
        self.promise.clone()
    }

    /// Runs the task to completion: awaits inputs, resolves its command,
    /// consults the staleness oracle, and (if stale) runs the command.
    /// Always resolves this task's own promise before returning, even on
    /// cancellation, so dependents never hang.
    ///
    /// # Errors
    ///
    /// Returns an error for genuine engine failures (bad config, expansion
    /// failure building the command line); a failing *command* is reported
    /// as `Ok` with a `Failed`/`Cancelled` outcome, not as an `Err`, so the
    /// scheduler can keep accounting for every task uniformly.
    pub async fn run(
        &mut self,
        jobs: &JobPool,
        cancel: &CancellationToken,
        outputs: &OutputRegistry,
    ) -> Result<Arc<TaskOutcome>> {
        self.state = TaskState::Started;

        let outcome = match self.run_inner(jobs, cancel, outputs).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = TaskState::Broken;
                self.sender.resolve(TaskOutcome::Failed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        self.state = match &outcome {
            TaskOutcome::Finished { .. } => TaskState::Finished,
            TaskOutcome::Skipped { .. } => TaskState::Skipped,
            TaskOutcome::Failed { .. } => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        };
        let outcome = Arc::new(outcome);
        self.sender.resolve((*outcome).clone());
        Ok(outcome)
    }

    async fn run_inner(
        &mut self,
        jobs: &JobPool,
        cancel: &CancellationToken,
        outputs: &OutputRegistry,
    ) -> Result<TaskOutcome> {
        self.state = TaskState::AwaitingInputs;
        let mut dep_out_files = Vec::new();
        for promise in &mut self.inputs {
            let outcome = promise.await_outcome().await;
            if !outcome.is_success() {
                return Ok(TaskOutcome::Cancelled);
            }
            dep_out_files.extend(outcome.out_files().to_vec());
        }

        self.state = TaskState::TaskInit;
        let init = self.task_init(&dep_out_files)?;

        if init.commands.is_empty() {
            return Ok(TaskOutcome::Finished {
                out_files: init.out_files,
            });
        }

        {
            let mut claimed = outputs.lock().expect("output registry lock poisoned");
            for out in &init.out_files {
                if !claimed.insert(out.clone()) {
                    return Err(TaskError::NameCollision(out.display().to_string()).into());
                }
            }
        }

        let force = self
            .config
            .get("force")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let depfile = self
            .config
            .get_expanded("in_depfile")?
            .and_then(|v| v.as_str().map(PathBuf::from))
            .filter(|p| p.exists());
        let depfile_format = match self.config.get("depformat").and_then(|v| v.as_str().map(str::to_owned)) {
            Some(s) if s.eq_ignore_ascii_case("msvc") => DepfileFormat::Msvc,
            _ => DepfileFormat::Gcc,
        };
        let decision = staleness::needs_rerun(&StalenessInputs {
            force,
            in_files: &init.in_files,
            out_files: &init.out_files,
            engine_path: &self.engine_path,
            depfile: depfile.as_deref(),
            depfile_format,
        })?;
        tracing::debug!(task = %self.name, reason = decision.reason.as_str(), rerun = decision.rerun, "staleness decision");

        if !decision.rerun {
            return Ok(TaskOutcome::Skipped {
                out_files: init.out_files,
            });
        }

        self.state = TaskState::AwaitingJobs;
        let job_count = self
            .config
            .get("job_count")
            .and_then(|v| v.as_int())
            .unwrap_or(1)
            .max(1) as usize;
        let _guard = jobs.acquire(&self.name, job_count, cancel).await?;

        self.state = TaskState::RunningCommands;
        let dry_run = self
            .config
            .get("dry_run")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if dry_run {
            tracing::info!(task = %self.name, cmds = ?init.commands, "dry run");
            return Ok(TaskOutcome::Finished {
                out_files: init.out_files,
            });
        }

        let should_fail = self
            .config
            .get("should_fail")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        for (index, command) in init.commands.iter().enumerate() {
            let builder = CommandBuilder::shell(command.clone())
                .name(format!("{} [{index}]", self.name))
                .cwd(init.task_dir.clone())
                .invert_success(should_fail);
            match builder.run_with_cancellation(cancel).await {
                Ok(output) if output.is_interrupted() => return Ok(TaskOutcome::Cancelled),
                Ok(_) => {}
                Err(e) => {
                    return Ok(TaskOutcome::Failed {
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(TaskOutcome::Finished {
            out_files: init.out_files,
        })
    }

    /// Resolves `task_dir`/`build_dir`, scans every visible config key for
    /// the `in_*`/`out_*` prefix convention (plus the special-cased
    /// `in_depfile`), and expands `command` into an ordered list of shell
    /// invocations. Sanity-checks that `task_dir` and every input exist, and
    /// that every output stays under `root_dir` when one is configured.
    fn task_init(&self, dep_out_files: &[PathBuf]) -> Result<TaskInit> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let task_dir_raw = self.config.require_expanded("task_dir")?;
        let task_dir = paths::abs_path(&cwd, Path::new(task_dir_raw.as_str().unwrap_or_default()));

        let build_dir = match self.config.get_expanded("build_dir")? {
            Some(v) => paths::abs_path(&cwd, Path::new(v.as_str().unwrap_or_default())),
            None => task_dir.clone(),
        };

        let mut in_files: Vec<PathBuf> = dep_out_files.to_vec();
        let mut out_files = Vec::new();

        for key in self.config.visible_keys() {
            if key == "in_depfile" {
                if let Some(value) = self.config.get_expanded(&key)? {
                    for rel in paths::flatten(&value) {
                        let resolved = paths::abs_path(&build_dir, Path::new(&rel));
                        if resolved.is_file() {
                            in_files.push(resolved);
                        }
                    }
                }
            } else if key.starts_with("out_") {
                if let Some(value) = self.config.get_expanded(&key)? {
                    for rel in paths::flatten(&value) {
                        out_files.push(paths::abs_path(&build_dir, Path::new(&rel)));
                    }
                }
            } else if key.starts_with("in_") {
                if let Some(value) = self.config.get_expanded(&key)? {
                    for rel in paths::flatten(&value) {
                        in_files.push(paths::abs_path(&task_dir, Path::new(&rel)));
                    }
                }
            }
        }

        let command_value = match self.config.get("command") {
            Some(raw) if !matches!(raw, Value::Null) => Some(expand_required(&raw, &self.config)?),
            _ => None,
        };
        let commands = command_value.as_ref().map(paths::flatten).unwrap_or_default();

        if !task_dir.is_dir() {
            return Err(FsError::NotFound(task_dir.display().to_string()).into());
        }
        for file in &in_files {
            if !file.exists() {
                return Err(FsError::NotFound(file.display().to_string()).into());
            }
        }
        if let Some(root_dir) = self.config.get("root_dir").and_then(|v| v.as_str().map(str::to_owned)) {
            let root_dir = paths::abs_path(&cwd, Path::new(&root_dir));
            for file in &out_files {
                if !file.starts_with(&root_dir) {
                    return Err(TaskError::ExecutionFailed {
                        name: self.name.clone(),
                        message: format!(
                            "output '{}' is not under root_dir '{}'",
                            file.display(),
                            root_dir.display()
                        ),
                    }
                    .into());
                }
            }
        }

        if !commands.is_empty() {
            let dry_run = self.config.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false);
            if !dry_run {
                for file in &out_files {
                    if let Some(parent) = file.parent() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                }
            }
        }

        Ok(TaskInit {
            task_dir,
            in_files,
            out_files,
            commands,
        })
    }
}

/// Result of resolving a task's config into concrete filesystem state: an
/// absolute `task_dir` to run commands in, resolved input/output paths, and
/// the flattened, ordered list of shell commands to execute.
struct TaskInit {
    task_dir: PathBuf,
    in_files: Vec<PathBuf>,
    out_files: Vec<PathBuf>,
    commands: Vec<String>,
}

/// Converts a task-not-found condition into the engine's error type.
pub fn not_found(target: impl Into<String>) -> HanchoError {
    TaskError::NotFound(target.into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base_config(dir: &std::path::Path) -> Arc<Config> {
        let cfg = Arc::new(Config::new(None));
        cfg.set("task_dir", dir.to_string_lossy().into_owned());
        cfg
    }

    fn registry() -> OutputRegistry {
        Arc::new(Mutex::new(HashSet::new()))
    }

    #[tokio::test]
    async fn task_with_no_command_finishes_immediately() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let mut task = Task::declare("noop", cfg, Vec::new(), engine);
        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let outcome = task.run(&jobs, &cancel, &registry()).await.unwrap();
        assert!(matches!(*outcome, TaskOutcome::Finished { .. }));
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[tokio::test]
    async fn task_runs_command_and_finishes() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let out_path = dir.path().join("out.txt");
        cfg.set("command", format!("echo hi > {}", out_path.display()));
        cfg.set("out_obj", out_path.to_string_lossy().into_owned());
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let mut task = Task::declare("build", cfg, Vec::new(), engine);
        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let outcome = task.run(&jobs, &cancel, &registry()).await.unwrap();
        if cfg!(not(windows)) {
            assert!(matches!(*outcome, TaskOutcome::Finished { .. }));
        }
    }

    #[tokio::test]
    async fn second_task_claiming_the_same_output_is_broken() {
        let dir = tempdir().unwrap();
        let out_path = dir.path().join("out.bin");
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let cfg_a = base_config(dir.path());
        cfg_a.set("command", "true");
        cfg_a.set("out_obj", out_path.to_string_lossy().into_owned());
        let cfg_b = base_config(dir.path());
        cfg_b.set("command", "true");
        cfg_b.set("out_obj", out_path.to_string_lossy().into_owned());

        let mut task_a = Task::declare("first", cfg_a, Vec::new(), engine.clone());
        let mut task_b = Task::declare("second", cfg_b, Vec::new(), engine);

        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let shared = registry();

        if cfg!(not(windows)) {
            task_a.run(&jobs, &cancel, &shared).await.unwrap();
            let result = task_b.run(&jobs, &cancel, &shared).await;
            assert!(result.is_err());
            assert_eq!(task_b.state(), TaskState::Broken);
        }
    }

    #[tokio::test]
    async fn task_cancels_when_dependency_fails() {
        let dir = tempdir().unwrap();
        let dep_cfg = base_config(dir.path());
        dep_cfg.set("command", "exit 1");
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let mut dep = Task::declare("dep", dep_cfg, Vec::new(), engine.clone());
        let dep_promise = dep.promise();

        let cfg = base_config(dir.path());
        let mut task = Task::declare("consumer", cfg, vec![dep_promise], engine);

        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let shared = registry();
        let _ = dep.run(&jobs, &cancel, &shared).await.unwrap();
        let outcome = task.run(&jobs, &cancel, &shared).await.unwrap();
        assert!(matches!(*outcome, TaskOutcome::Cancelled));
    }

    #[tokio::test]
    async fn multi_command_list_runs_in_order_and_stops_on_first_failure() {
        if cfg!(windows) {
            return;
        }
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let marker_three = dir.path().join("three.txt");
        cfg.set(
            "command",
            Value::List(vec![
                Value::from("true"),
                Value::from("exit 1"),
                Value::from(format!("touch {}", marker_three.display())),
            ]),
        );
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let mut task = Task::declare("build", cfg, Vec::new(), engine);
        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let outcome = task.run(&jobs, &cancel, &registry()).await.unwrap();
        assert!(matches!(*outcome, TaskOutcome::Failed { .. }));
        assert!(!marker_three.exists());
    }

    #[tokio::test]
    async fn should_fail_treats_a_zero_exit_as_a_failure() {
        if cfg!(windows) {
            return;
        }
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        cfg.set("command", "true");
        cfg.set("should_fail", true);
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let mut task = Task::declare("expect-fail", cfg, Vec::new(), engine);
        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let outcome = task.run(&jobs, &cancel, &registry()).await.unwrap();
        assert!(matches!(*outcome, TaskOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn command_runs_with_task_dir_as_its_working_directory() {
        if cfg!(windows) {
            return;
        }
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let marker = dir.path().join("here.txt");
        cfg.set("command", "touch here.txt");
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let mut task = Task::declare("build", cfg, Vec::new(), engine);
        let jobs = JobPool::new(1);
        let cancel = CancellationToken::new();
        let outcome = task.run(&jobs, &cancel, &registry()).await.unwrap();
        assert!(matches!(*outcome, TaskOutcome::Finished { .. }));
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn in_and_out_prefixed_keys_are_collected_from_anywhere_in_the_config() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let src = dir.path().join("main.cpp");
        std::fs::write(&src, "int main() {}").unwrap();
        cfg.set("in_src", src.to_string_lossy().into_owned());
        cfg.set("out_obj", "main.o");
        let engine = dir.path().join("engine");
        std::fs::write(&engine, b"x").unwrap();

        let task = Task::declare("compile", cfg, Vec::new(), engine);
        let init = task.task_init(&[]).unwrap();
        assert_eq!(init.in_files, vec![src]);
        assert_eq!(init.out_files, vec![dir.path().join("main.o")]);
    }
}
