// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Entry point.
//!
//! ```text
//! cli::parse() --> Logging --> Loader (Rhai) --> Scheduler --> ExitCode
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use mimalloc::MiMalloc;

use hancho::cli::{self, Cli};
use hancho::config::Config;
use hancho::loader::{self, Loader};
use hancho::logging::{LogConfig, LogLevel, init_logging};
use hancho::scheduler::{Scheduler, SchedulerOptions};
use hancho::task::Task;
use hancho::value::maybe_as_number;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, overrides) = cli::parse();

    let log_config = build_log_config(&cli);
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &overrides).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn build_log_config(cli: &Cli) -> LogConfig {
    let base = if cli.quiet {
        LogLevel::ERROR
    } else if cli.trace {
        LogLevel::DUMP
    } else {
        LogLevel::from_verbosity(LogLevel::INFO, cli.verbose)
    };
    let console_level = cli.log_level.and_then(LogLevel::from_u8).unwrap_or(base);

    LogConfig::builder()
        .with_console_level(console_level)
        .with_file_level(LogLevel::TRACE)
        .maybe_with_log_file(cli.log_file.clone())
        .build()
}

async fn run(cli: &Cli, overrides: &[(String, String)]) -> hancho::error::Result<ExitCode> {
    let root_dir = match &cli.chdir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let script_path = root_dir.join(&cli.file);
    let engine_path = std::env::current_exe().unwrap_or_else(|_| script_path.clone());

    let root_config = Arc::new(Config::root());
    root_config.set("root_dir", root_dir.to_string_lossy().into_owned());
    root_config.set("repo_dir", root_dir.to_string_lossy().into_owned());
    root_config.set("repo_name", root_dir.file_name().map_or_else(
        || String::new(),
        |n| n.to_string_lossy().into_owned(),
    ));
    root_config.set("force", cli.force);
    root_config.set("dry_run", cli.dry_run);
    if let Some(jobs) = cli.jobs {
        root_config.set("jobs", jobs as i64);
    }
    for (key, val) in overrides {
        root_config.set(key.clone(), maybe_as_number(val));
    }

    let loader = Loader::new(root_dir.clone(), engine_path.clone());
    loader.load_root(&script_path, Arc::clone(&root_config))?;
    let declared = loader.take_declared();

    if cli.debug {
        for task in &declared {
            println!("task {} -> keys: {:?}", task.name, task.config.visible_keys());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut by_name = HashMap::new();
    let mut tasks = Vec::with_capacity(declared.len());
    for d in declared {
        let promises = loader::resolve_dependencies(&d, &by_name)?;
        let task = loader::build_task(d, promises, engine_path.clone());
        by_name.insert(task.name().to_string(), task.promise());
        tasks.push(task);
    }

    let jobs = cli
        .jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
    let options = SchedulerOptions {
        jobs,
        shuffle: cli.shuffle,
        keep_going: cli.keep_going,
        targets: cli.targets.clone(),
    };
    let scheduler = Scheduler::new(options);
    let selected_names: Vec<String> = scheduler
        .select(&tasks)?
        .into_iter()
        .map(|t| t.name().to_string())
        .collect();
    let selected: Vec<Task> = tasks
        .into_iter()
        .filter(|t| selected_names.contains(&t.name().to_string()))
        .collect();

    let summary = scheduler.run(selected, &root_dir).await;
    tracing::info!(
        finished = summary.finished,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "build finished"
    );

    Ok(match summary.exit_code() {
        0 => ExitCode::SUCCESS,
        code => ExitCode::from(code as u8),
    })
}
