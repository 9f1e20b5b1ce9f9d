// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Spawns a [`CommandBuilder`] through the platform shell and streams its
//! output, with optional cooperative cancellation.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ProcessError, Result};

use super::builder::{CommandBuilder, CommandOutput};

impl CommandBuilder {
    fn build_command(&self) -> Command {
        let (shell, flag) = if cfg!(windows) {
            ("pwsh", "-Command")
        } else {
            ("/bin/sh", "-c")
        };
        let mut command = Command::new(shell);
        if cfg!(windows) {
            command.arg("-NoProfile").arg("-NonInteractive");
        }
        command.arg(flag).arg(self.command_str());
        if let Some(cwd) = self.working_dir() {
            command.current_dir(cwd);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        command
    }

    /// Runs the command to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the process fails to spawn, or if it exits with a
    /// status not in the builder's success-code set.
    pub async fn run(&self) -> Result<CommandOutput> {
        let name = self.display_name();
        debug!(cmd = %self.command_str(), "exec");

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                command: self.command_str().to_string(),
                source,
            })?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout).await;
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr).await;
        }
        let status = child.wait().await.map_err(|source| ProcessError::SpawnFailed {
            command: self.command_str().to_string(),
            source,
        })?;
        let exit_code = status.code().unwrap_or(-1);
        let output = CommandOutput::new(exit_code, stdout, stderr, false);

        let passed = self.success_code_set().contains(&exit_code) != self.inverts_success();
        if !passed {
            return Err(ProcessError::NonZeroExit {
                command: name,
                code: exit_code,
                expected: self.success_code_set().to_vec(),
            }
            .into());
        }
        trace!(process = %name, exit_code, "completed");
        Ok(output)
    }

    /// Runs the command with cancellation support: if `token` fires before
    /// the process exits, the child is killed and the result reports
    /// `interrupted = true` instead of an error.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), except an interruption is not itself an
    /// error.
    pub async fn run_with_cancellation(
        &self,
        token: &CancellationToken,
    ) -> Result<CommandOutput> {
        if token.is_cancelled() {
            return Ok(CommandOutput::new(-1, String::new(), String::new(), true));
        }

        let name = self.display_name();
        debug!(cmd = %self.command_str(), "exec");

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                command: self.command_str().to_string(),
                source,
            })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let wait = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(out) = stdout_pipe.as_mut() {
                let _ = out.read_to_string(&mut stdout).await;
            }
            if let Some(err) = stderr_pipe.as_mut() {
                let _ = err.read_to_string(&mut stderr).await;
            }
            let status = child.wait().await;
            (status, stdout, stderr)
        };

        tokio::select! {
            (status, stdout, stderr) = wait => {
                let status = status.map_err(|source| ProcessError::SpawnFailed {
                    command: self.command_str().to_string(),
                    source,
                })?;
                let exit_code = status.code().unwrap_or(-1);
                let passed = self.success_code_set().contains(&exit_code) != self.inverts_success();
                if !passed {
                    return Err(ProcessError::NonZeroExit {
                        command: name,
                        code: exit_code,
                        expected: self.success_code_set().to_vec(),
                    }
                    .into());
                }
                trace!(process = %name, exit_code, "completed");
                Ok(CommandOutput::new(exit_code, stdout, stderr, false))
            }
            () = token.cancelled() => {
                trace!(process = %name, "interrupted");
                Ok(CommandOutput::new(-1, String::new(), String::new(), true))
            }
        }
    }
}
