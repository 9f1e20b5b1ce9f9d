// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Builder for a task's shell command.

use std::path::PathBuf;

/// Output of a completed (or interrupted) command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
    interrupted: bool,
}

impl CommandOutput {
    #[must_use]
    pub const fn new(exit_code: i32, stdout: String, stderr: String, interrupted: bool) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            interrupted,
        }
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }
}

/// Builds a shell invocation of a task's (already macro-expanded) command
/// string: `pwsh -NoProfile -NonInteractive -Command <cmd>` on Windows,
/// `/bin/sh -c <cmd>` elsewhere.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    command: String,
    cwd: Option<PathBuf>,
    name: Option<String>,
    success_codes: Vec<i32>,
    invert_success: bool,
}

impl CommandBuilder {
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            name: None,
            success_codes: vec![0],
            invert_success: false,
        }
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn success_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_codes = codes;
        self
    }

    /// Inverts pass/fail: when `true`, an exit code in `success_codes` is a
    /// failure and anything else is a pass (`should_fail`).
    #[must_use]
    pub fn invert_success(mut self, invert: bool) -> Self {
        self.invert_success = invert;
        self
    }

    pub(super) fn command_str(&self) -> &str {
        &self.command
    }

    pub(super) fn working_dir(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }

    pub(super) fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.command.clone())
    }

    pub(super) fn success_code_set(&self) -> &[i32] {
        &self.success_codes
    }

    pub(super) fn inverts_success(&self) -> bool {
        self.invert_success
    }
}
