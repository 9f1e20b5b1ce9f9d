// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Process execution for a task's command.
//!
//! ```text
//! CommandBuilder::shell(cmd) --> run() / run_with_cancellation(token)
//!        |
//!        v
//!     spawn, stream stdout/stderr, kill_on_drop(true)
//!        |
//!        v
//!   CommandOutput { exit_code, stdout, stderr, interrupted }
//! ```

mod builder;
mod runner;

pub use builder::{CommandBuilder, CommandOutput};
