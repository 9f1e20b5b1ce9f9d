// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Command-line interface.
//!
//! ```text
//! hancho [-f file] [-C dir] [-j n] [-v]... [-q] [-n] [-d] [-s]
//!        [--force] [--keep-going] [--trace] [--key=val]... [target...]
//! ```

use clap::Parser;

/// A small general-purpose build system.
#[derive(Debug, Parser)]
#[command(
    name = "hancho",
    author,
    version,
    about = "A small general-purpose build system",
    long_about = "hancho loads a build script, expands task configs, and runs \
                  whatever is stale under a bounded job pool.\n\n\
                  Unrecognized --key[=val] options become fields on the root \
                  config, visible to every task's macro expansion."
)]
pub struct Cli {
    /// Root build script to load.
    #[arg(short = 'f', long = "file", default_value = "build.hancho")]
    pub file: String,

    /// Change to this directory before doing anything else.
    #[arg(short = 'C', long = "chdir")]
    pub chdir: Option<String>,

    /// Job pool capacity (defaults to the number of CPUs).
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Increase verbosity (repeatable).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Dry run: print commands, don't execute them.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Debug dump: print the fully expanded config/task graph, don't run.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Ignore the staleness oracle, rerun everything.
    #[arg(long = "force")]
    pub force: bool,

    /// Shuffle queued task order.
    #[arg(short = 's', long = "shuffle")]
    pub shuffle: bool,

    /// Keep running after a task fails instead of cancelling the rest.
    #[arg(short = 'k', long = "keep-going")]
    pub keep_going: bool,

    /// Emit macro-expansion trace lines.
    #[arg(long = "trace")]
    pub trace: bool,

    /// Write logs to this file in addition to the console.
    #[arg(long = "log-file")]
    pub log_file: Option<String>,

    /// Explicit log level (0-6), overrides `-v`/`-q`.
    #[arg(long = "log-level")]
    pub log_level: Option<u8>,

    /// Target name patterns (regex), or every task under the root if empty.
    pub targets: Vec<String>,
}

/// Parses command-line arguments, with unrecognized `--key[=val]` options
/// split out first so they don't trip up clap's derive parser.
#[must_use]
pub fn parse() -> (Cli, Vec<(String, String)>) {
    let args: Vec<String> = std::env::args().collect();
    let (known, overrides) = split_overrides(&args);
    (Cli::parse_from(known), overrides)
}

/// Parses command-line arguments from an iterator (used by tests).
pub fn parse_from<I, T>(iter: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::parse_from(iter)
}

/// The flags hancho itself recognizes; anything else starting with `--` is
/// taken as a `--key=val` root config override, matching the original
/// engine's "unknown flags become config fields" contract.
const KNOWN_LONG_FLAGS: &[&str] = &[
    "--file",
    "--chdir",
    "--jobs",
    "--quiet",
    "--dry-run",
    "--debug",
    "--force",
    "--shuffle",
    "--keep-going",
    "--trace",
    "--log-file",
    "--log-level",
    "--help",
    "--version",
];

/// Splits `args` into (known-flag args hancho's CLI parser should see,
/// `key=val` overrides destined for the root config).
#[must_use]
pub fn split_overrides(args: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut known = Vec::with_capacity(args.len());
    let mut overrides = Vec::new();
    for arg in args {
        if let Some(rest) = arg.strip_prefix("--") {
            let flag = format!("--{}", rest.split('=').next().unwrap_or(rest));
            if !KNOWN_LONG_FLAGS.contains(&flag.as_str()) {
                let (key, val) = rest.split_once('=').unwrap_or((rest, "true"));
                overrides.push((key.to_string(), val.to_string()));
                continue;
            }
        }
        known.push(arg.clone());
    }
    (known, overrides)
}
