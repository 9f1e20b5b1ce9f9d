// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error handling module.
//!
//! ```text
//!              HanchoError
//!                     |
//!   +---------+-------+-------+---------+
//!   |    |    |    |    |    |    |      |
//!   v    v    v    v    v    v    v      v
//! Bail  Cfg  Expand Task Proc Loader Fs  Io/Other
//!       Box  Box   Box  Box  Box    Box  Box<str>
//! ```

use thiserror::Error;

/// Convenience alias for `anyhow::Result`, used at application boundaries.
pub type Result<T> = anyhow::Result<T>;

/// Result type using [`HanchoError`], used where callers match on error kind.
pub type HanchoResult<T> = std::result::Result<T, HanchoError>;

/// Top-level engine error type. Sub-errors are boxed to keep this enum small.
#[derive(Debug, Error)]
pub enum HanchoError {
    /// Fatal error that should terminate the build.
    #[error("fatal error: {0}")]
    Bailed(Box<str>),

    /// Config lookup/merge error.
    #[error("config error: {0}")]
    Config(#[from] Box<ConfigError>),

    /// Macro expansion error.
    #[error("expand error: {0}")]
    Expand(#[from] Box<ExpandError>),

    /// Task graph error.
    #[error("task error: {0}")]
    Task(#[from] Box<TaskError>),

    /// Process execution error.
    #[error("process error: {0}")]
    Process(#[from] Box<ProcessError>),

    /// Build script loading error.
    #[error("loader error: {0}")]
    Loader(#[from] Box<LoaderError>),

    /// Filesystem error.
    #[error("filesystem error: {0}")]
    Fs(#[from] Box<FsError>),

    /// The run was cancelled (Ctrl-C, or a dependency failed).
    #[error("cancelled")]
    Cancelled,

    /// I/O error.
    #[error("io error: {0}")]
    Io(Box<std::io::Error>),

    /// Generic error with message.
    #[error("{0}")]
    Other(Box<str>),
}

/// Creates a fatal [`HanchoError::Bailed`].
pub fn bail_out(message: impl Into<String>) -> HanchoError {
    HanchoError::Bailed(message.into().into_boxed_str())
}

macro_rules! impl_from_boxed {
    ($($error:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$error> for HanchoError {
                fn from(err: $error) -> Self {
                    HanchoError::$variant(Box::new(err))
                }
            }
        )+
    };
}

impl_from_boxed! {
    ConfigError => Config,
    ExpandError => Expand,
    TaskError => Task,
    ProcessError => Process,
    LoaderError => Loader,
    FsError => Fs,
    std::io::Error => Io,
}

/// Errors from `Config` lookup, merge and value coercion.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key was missing and had no default.
    #[error("missing config key '{0}'")]
    MissingKey(String),

    /// A value had the wrong shape for the operation (e.g. list expected).
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Expected one `Value` variant, found another.
    #[error("type mismatch for '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors from macro expansion (`{...}` templates).
#[derive(Debug, Error)]
pub enum ExpandError {
    /// Expansion did not reach a fixed point within `MAX_EXPAND_DEPTH` passes.
    #[error("macro expansion exceeded depth limit ({limit}) in '{text}'")]
    RecursionLimit { text: String, limit: usize },

    /// A macro was still unresolved where a concrete value was required
    /// (e.g. building a command line). Outside such contexts this is not
    /// raised — unresolved macros are left as literal text (TEFINAE).
    #[error("unresolved macro '{macro_text}' in '{text}'")]
    UnresolvedMacro { text: String, macro_text: String },

    /// An expression inside `{...}` failed to evaluate.
    #[error("failed to evaluate '{expr}': {message}")]
    EvalError { expr: String, message: String },
}

/// Errors from the task graph / scheduler.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task matched a target pattern.
    #[error("no task matches target '{0}'")]
    NotFound(String),

    /// Two declared tasks ended up with the same resolved name.
    #[error("duplicate task name '{0}'")]
    NameCollision(String),

    /// A task could not run because one of its dependencies failed.
    #[error("task '{task}' cannot run: dependency '{dependency}' failed")]
    DependencyFailed { task: String, dependency: String },

    /// A task's command exited with a disallowed status.
    #[error("task '{name}' failed: {message}")]
    ExecutionFailed { name: String, message: String },

    /// A task asked for more job slots than the pool's capacity; the request
    /// can never be satisfied.
    #[error("task '{name}' requested {requested} job slots, pool capacity is {capacity}")]
    Unschedulable {
        name: String,
        requested: usize,
        capacity: usize,
    },
}

/// Errors from running a task's command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Failed to spawn the child process.
    #[error("failed to spawn process '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited with a status not in the task's allowed set.
    #[error("process '{command}' exited with code {code} (expected one of {expected:?})")]
    NonZeroExit {
        command: String,
        code: i32,
        expected: Vec<i32>,
    },
}

/// Errors from loading and evaluating build scripts.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Build script file does not exist.
    #[error("build script not found: {0}")]
    NotFound(String),

    /// `load()` formed a cycle.
    #[error("build script load cycle detected at '{0}'")]
    Cycle(String),

    /// The scripting engine rejected or failed to run the script.
    #[error("error evaluating '{path}': {message}")]
    ScriptError { path: String, message: String },
}

/// Filesystem errors (mtime lookups, depfile reads).
#[derive(Debug, Error)]
pub enum FsError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("I/O error on '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_variants_keep_error_small() {
        assert!(std::mem::size_of::<HanchoError>() <= 32);
    }

    #[test]
    fn bail_out_builds_bailed_variant() {
        match bail_out("nope") {
            HanchoError::Bailed(msg) => assert_eq!(&*msg, "nope"),
            _ => panic!("wrong variant"),
        }
    }
}
