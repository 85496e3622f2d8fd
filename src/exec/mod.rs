//! Isolated command execution.
//!
//! An [`ExecutionContext`] is a run-scoped environment (a long-lived container,
//! or the host shell) that runs one command at a time and captures its output.
//! It knows nothing about builds, tests or mutants; the pipeline gives the
//! commands their meaning.

mod container;
mod local;
#[cfg(test)]
pub(crate) mod scripted;

pub use container::ContainerContext;
pub use local::LocalContext;

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Exit code reported for commands killed by the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the process ended without one (killed by a signal).
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Captured outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl CommandResult {
    /// Exit code zero and no timeout.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout followed by stderr, the way tool reports are read back.
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start execution context {context}: {message}")]
    Start { context: String, message: String },
    #[error("execution context {0} is not running")]
    NotRunning(String),
}

/// A reusable environment commands run inside.
///
/// Lifecycle is `Stopped -> Running -> Stopped`; `stop` may be called any
/// number of times.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Human-readable identity for logs.
    fn describe(&self) -> String;

    fn is_running(&self) -> bool;

    /// Provision the environment. Failures are reported, never retried.
    async fn start(&mut self) -> Result<(), ExecError>;

    /// Run `command` and capture its output, giving up after `timeout`.
    ///
    /// A timeout is not an error: it yields `timed_out = true` and
    /// [`TIMEOUT_EXIT_CODE`]. `Err` means the command could not be run at all.
    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandResult, ExecError>;

    /// Tear the environment down.
    async fn stop(&mut self);
}

/// Run a prepared process with a wall-clock timeout.
///
/// The child is killed when the timeout fires (`kill_on_drop`), so this returns
/// no later than `timeout` plus the time the OS needs to reap it.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    program: &str,
    timeout: Duration,
) -> Result<CommandResult, ExecError> {
    let start = Instant::now();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let result = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => Ok(CommandResult {
            exit_code: output.status.code().unwrap_or(SIGNALLED_EXIT_CODE),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
            duration_ms,
        }),
        Ok(Err(source)) => Err(ExecError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => {
            tracing::debug!("`{}` timed out after {:?}", program, timeout);
            Ok(CommandResult {
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("Command timed out after {} seconds", timeout.as_secs()),
                timed_out: true,
                duration_ms,
            })
        }
    }
}

/// Keep the first `max_bytes` of `output` (on a char boundary).
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &output[..cut])
}
