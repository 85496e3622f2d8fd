//! Scripted execution context for tests.

use super::{CommandResult, ExecError, ExecutionContext, TIMEOUT_EXIT_CODE};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// What the scripted context answers for a command.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit { code: i32, stdout: String },
    /// Delete `dir` (pulling the tree out from under the pipeline), then exit with `code`
    RemoveDir { dir: PathBuf, code: i32 },
    Timeout,
    Error,
    Panic,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.to_string(),
        }
    }

    pub fn fail(code: i32, stdout: &str) -> Self {
        Reply::Exit {
            code,
            stdout: stdout.to_string(),
        }
    }
}

/// Answers commands by prefix and records what the watched file looked like
/// at the moment each command ran.
#[derive(Debug)]
pub struct ScriptedContext {
    watched: Option<PathBuf>,
    rules: Vec<(String, Reply)>,
    running: bool,
    pub fail_start: bool,
    pub calls: Mutex<Vec<(String, Option<String>)>>,
    pub stops: Mutex<usize>,
}

impl ScriptedContext {
    pub fn new() -> Self {
        Self {
            watched: None,
            rules: Vec::new(),
            running: false,
            fail_start: false,
            calls: Mutex::new(Vec::new()),
            stops: Mutex::new(0),
        }
    }

    pub fn watching(mut self, path: impl Into<PathBuf>) -> Self {
        self.watched = Some(path.into());
        self
    }

    /// Commands starting with `prefix` get `reply`; unmatched commands exit 0.
    pub fn on(mut self, prefix: &str, reply: Reply) -> Self {
        self.rules.push((prefix.to_string(), reply));
        self
    }

    pub fn running(mut self) -> Self {
        self.running = true;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn snapshots(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionContext for ScriptedContext {
    fn describe(&self) -> String {
        "scripted context".to_string()
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn start(&mut self) -> Result<(), ExecError> {
        if self.fail_start {
            return Err(ExecError::Start {
                context: self.describe(),
                message: "image not found".to_string(),
            });
        }
        self.running = true;
        Ok(())
    }

    async fn exec(&self, command: &str, _timeout: Duration) -> Result<CommandResult, ExecError> {
        let snapshot = self
            .watched
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok());
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), snapshot));

        let reply = self
            .rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::ok(""));

        match reply {
            Reply::Exit { code, stdout } => Ok(CommandResult {
                exit_code: code,
                stdout,
                stderr: String::new(),
                timed_out: false,
                duration_ms: 0,
            }),
            Reply::RemoveDir { dir, code } => {
                std::fs::remove_dir_all(&dir).unwrap();
                Ok(CommandResult {
                    exit_code: code,
                    stdout: String::new(),
                    stderr: format!("removed {}", dir.display()),
                    timed_out: false,
                    duration_ms: 0,
                })
            }
            Reply::Timeout => Ok(CommandResult {
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: String::new(),
                stderr: "Command timed out".to_string(),
                timed_out: true,
                duration_ms: 0,
            }),
            Reply::Error => Err(ExecError::Spawn {
                program: "podman".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection lost"),
            }),
            Reply::Panic => panic!("scripted panic while running `{}`", command),
        }
    }

    async fn stop(&mut self) {
        *self.stops.lock().unwrap() += 1;
        self.running = false;
    }
}
