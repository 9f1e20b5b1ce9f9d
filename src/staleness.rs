// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The staleness oracle: decides whether a task's command needs to run.
//!
//! Ordered rule list, first match wins (ported verbatim from the original
//! engine's `needs_rerun`). Every decision is tagged with a [`LogReason`] so
//! `-d`/`--trace` output can show why a task did or didn't rerun.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::logging::LogReason;
use crate::paths::mtime;

/// Inputs to a staleness decision, already resolved to concrete paths.
pub struct StalenessInputs<'a> {
    pub force: bool,
    pub in_files: &'a [PathBuf],
    pub out_files: &'a [PathBuf],
    pub engine_path: &'a Path,
    pub depfile: Option<&'a Path>,
    pub depfile_format: DepfileFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepfileFormat {
    #[default]
    Gcc,
    Msvc,
}

/// Outcome of a staleness check: whether to rerun, and why.
pub struct Decision {
    pub rerun: bool,
    pub reason: LogReason,
}

/// Decides whether a task needs to (re)run its command.
///
/// # Errors
///
/// Returns an error if an `mtime` lookup fails for a reason other than the
/// path being missing (missing paths are handled by the staleness rules
/// themselves, not treated as I/O errors).
pub fn needs_rerun(inputs: &StalenessInputs<'_>) -> Result<Decision> {
    if inputs.force {
        return Ok(Decision {
            rerun: true,
            reason: LogReason::Force,
        });
    }

    if inputs.in_files.is_empty() {
        return Ok(Decision {
            rerun: true,
            reason: LogReason::NoInputs,
        });
    }

    if inputs.out_files.is_empty() {
        return Ok(Decision {
            rerun: true,
            reason: LogReason::NoOutputs,
        });
    }

    let mut out_mtimes = Vec::with_capacity(inputs.out_files.len());
    for out in inputs.out_files {
        match mtime(out) {
            Ok(t) => out_mtimes.push(t),
            Err(_) => {
                return Ok(Decision {
                    rerun: true,
                    reason: LogReason::MissingOutput,
                });
            }
        }
    }
    let oldest_out = out_mtimes.iter().copied().min().expect("checked non-empty above");

    for input in inputs.in_files {
        let in_time = mtime(input)?;
        // Ported: `>=`, not `>` — equal mtimes count as stale, since
        // coarse filesystem timestamp resolution makes "strictly newer"
        // miss genuine rebuilds on fast successive runs.
        if in_time >= oldest_out {
            return Ok(Decision {
                rerun: true,
                reason: LogReason::StaleMtime,
            });
        }
    }

    if let Ok(engine_time) = mtime(inputs.engine_path)
        && engine_time >= oldest_out
    {
        return Ok(Decision {
            rerun: true,
            reason: LogReason::EngineNewer,
        });
    }

    if let Some(depfile) = inputs.depfile
        && let Ok(contents) = std::fs::read_to_string(depfile)
    {
        let deps = match inputs.depfile_format {
            DepfileFormat::Gcc => parse_gcc_depfile(&contents),
            DepfileFormat::Msvc => parse_msvc_depfile(&contents),
        };
        for dep in deps {
            if let Ok(dep_time) = mtime(Path::new(&dep))
                && dep_time >= oldest_out
            {
                return Ok(Decision {
                    rerun: true,
                    reason: LogReason::Depfile,
                });
            }
        }
    }

    Ok(Decision {
        rerun: false,
        reason: LogReason::Generic,
    })
}

/// Parses a gcc/make-style depfile: `target: dep1 dep2 \` with backslash
/// line continuations, whitespace-separated, and drops the target before the
/// first bare `:`.
#[must_use]
pub fn parse_gcc_depfile(contents: &str) -> Vec<String> {
    let joined = contents.replace("\\\n", " ");
    let mut deps = Vec::new();
    for line in joined.lines() {
        let rest = match line.split_once(':') {
            Some((_, rest)) => rest,
            None => line,
        };
        for token in rest.split_whitespace() {
            deps.push(token.to_string());
        }
    }
    deps
}

#[derive(serde::Deserialize)]
struct MsvcDepfile {
    #[serde(rename = "Data")]
    data: MsvcDepfileData,
}

#[derive(serde::Deserialize)]
struct MsvcDepfileData {
    #[serde(rename = "Includes")]
    includes: Vec<String>,
}

/// Parses MSVC's `/sourceDependencies` depfile: JSON, dependency list at
/// `Data.Includes`. Malformed or unreadable JSON yields no dependencies
/// rather than an error — a missing depfile already skips this rule.
#[must_use]
pub fn parse_msvc_depfile(contents: &str) -> Vec<String> {
    serde_json::from_str::<MsvcDepfile>(contents)
        .map(|parsed| parsed.data.includes)
        .unwrap_or_default()
}
