// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The scheduler: builds the task graph, selects targets, and drives every
//! selected task to completion.
//!
//! ```text
//! build graph (Declared) -> select targets -> shuffle? -> spawn all
//!        |
//!        v
//! each task's future independently awaits its own input Promises
//! (the dependency graph topological order falls out of that, not an
//!  explicit up-front sort)
//!        |
//!        v
//! first Failed task cancels the run, unless --keep-going
//!        |
//!        v
//! Summary { finished, skipped, failed, cancelled } -> exit code
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;
use regex::Regex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::job::JobPool;
use crate::task::{Task, TaskOutcome};

/// Aggregate outcome of a scheduler run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub finished: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Summary {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.finished + self.skipped + self.failed + self.cancelled
    }

    /// Exit code: 0 if nothing failed or was cancelled, 1 if anything
    /// failed, 2 if the run was cancelled before every task finished.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else if self.cancelled > 0 {
            2
        } else {
            0
        }
    }
}

/// Options controlling how the scheduler selects and orders tasks.
pub struct SchedulerOptions {
    pub jobs: usize,
    pub shuffle: bool,
    pub keep_going: bool,
    pub targets: Vec<String>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            shuffle: false,
            keep_going: false,
            targets: Vec::new(),
        }
    }
}

/// Drives a list of declared tasks to completion.
pub struct Scheduler {
    options: SchedulerOptions,
}

impl Scheduler {
    #[must_use]
    pub const fn new(options: SchedulerOptions) -> Self {
        Self { options }
    }

    /// Selects the tasks matching `options.targets` (regex against the
    /// task's `name`). With no targets given, defaults to every task whose
    /// declaring script's directory is the root repo's directory (so a
    /// bare `hancho` run doesn't build every task reachable through a
    /// `load()`-ed sub-repo).
    ///
    /// # Errors
    ///
    /// Returns an error if a target pattern is not a valid regex.
    pub fn select<'a>(&self, tasks: &'a [Task]) -> anyhow::Result<Vec<&'a Task>> {
        if self.options.targets.is_empty() {
            return Ok(tasks.iter().filter(|t| Self::is_in_root_repo(t)).collect());
        }
        let patterns: Vec<Regex> = self
            .options
            .targets
            .iter()
            .map(|t| Regex::new(t))
            .collect::<std::result::Result<_, _>>()?;

        Ok(tasks
            .iter()
            .filter(|t| patterns.iter().any(|re| re.is_match(t.name())))
            .collect())
    }

    /// A task with no `root_dir`/`repo_dir` configured is always included
    /// (most unit-constructed tasks never set either); one with both set is
    /// included only when they're equal.
    fn is_in_root_repo(task: &Task) -> bool {
        let root_dir = task.config().get("root_dir").and_then(|v| v.as_str().map(str::to_owned));
        let repo_dir = task.config().get("repo_dir").and_then(|v| v.as_str().map(str::to_owned));
        match (root_dir, repo_dir) {
            (Some(root_dir), Some(repo_dir)) => root_dir == repo_dir,
            _ => true,
        }
    }

    /// Runs every task in `tasks` to completion, cancelling the remaining
    /// run on the first failure unless `keep_going` is set.
    pub async fn run(&self, mut tasks: Vec<Task>, root_dir: &PathBuf) -> Summary {
        let _ = root_dir;
        if self.options.shuffle {
            tasks.shuffle(&mut rand::thread_rng());
        }

        let jobs = Arc::new(JobPool::new(self.options.jobs.max(1)));
        let cancel = CancellationToken::new();
        let outputs: crate::task::OutputRegistry = Arc::default();
        let total = tasks.len();
        let keep_going = self.options.keep_going;

        let progress = indicatif::ProgressBar::new(total as u64);
        progress.set_style(
            indicatif::ProgressStyle::with_template("[{pos}/{len}] {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
        );

        let mut set = JoinSet::new();
        for mut task in tasks {
            let jobs = Arc::clone(&jobs);
            let cancel = cancel.clone();
            let outputs = Arc::clone(&outputs);
            set.spawn(async move {
                let name = task.name().to_string();
                let result = task.run(&jobs, &cancel, &outputs).await;
                (name, result)
            });
        }

        let mut summary = Summary::default();
        while let Some(joined) = set.join_next().await {
            if let Ok((name, _)) = &joined {
                progress.set_message(name.clone());
                progress.inc(1);
            }
            let joined = joined.map(|(_, result)| result);
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Arc::new(TaskOutcome::Failed {
                    message: "task engine error".to_string(),
                }),
                Err(_) => Arc::new(TaskOutcome::Cancelled),
            };
            match &*outcome {
                TaskOutcome::Finished { .. } => summary.finished += 1,
                TaskOutcome::Skipped { .. } => summary.skipped += 1,
                TaskOutcome::Failed { .. } => {
                    summary.failed += 1;
                    if !keep_going {
                        cancel.cancel();
                    }
                }
                TaskOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        progress.finish_and_clear();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;

    fn engine_path(dir: &std::path::Path) -> PathBuf {
        let p = dir.join("engine");
        std::fs::write(&p, b"x").unwrap();
        p
    }

    #[tokio::test]
    async fn select_filters_by_target_regex() {
        let dir = tempdir().unwrap();
        let engine = engine_path(dir.path());
        let cfg_a = StdArc::new(Config::new(None));
        let cfg_b = StdArc::new(Config::new(None));
        let tasks = vec![
            Task::declare("alpha", cfg_a, Vec::new(), engine.clone()),
            Task::declare("beta", cfg_b, Vec::new(), engine),
        ];
        let scheduler = Scheduler::new(SchedulerOptions {
            targets: vec!["^a".to_string()],
            ..Default::default()
        });
        let selected = scheduler.select(&tasks).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "alpha");
    }

    #[tokio::test]
    async fn run_reports_summary_counts() {
        let dir = tempdir().unwrap();
        let engine = engine_path(dir.path());
        let cfg = StdArc::new(Config::new(None));
        cfg.set("task_dir", dir.path().to_string_lossy().into_owned());
        let tasks = vec![Task::declare("noop", cfg, Vec::new(), engine)];
        let scheduler = Scheduler::new(SchedulerOptions::default());
        let summary = scheduler.run(tasks, &dir.path().to_path_buf()).await;
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.exit_code(), 0);
    }
}
