use super::{run_with_timeout, CommandResult, ExecError, ExecutionContext};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Runs commands through `sh -c` directly on the host, in `working_dir`.
///
/// Offers no isolation beyond the working directory; meant for toolchains
/// installed on the host and for exercising the pipeline in tests.
#[derive(Debug, Clone)]
pub struct LocalContext {
    working_dir: PathBuf,
    running: bool,
}

impl LocalContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            running: false,
        }
    }
}

#[async_trait]
impl ExecutionContext for LocalContext {
    fn describe(&self) -> String {
        format!("local shell in {}", self.working_dir.display())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn start(&mut self) -> Result<(), ExecError> {
        if !self.working_dir.is_dir() {
            return Err(ExecError::Start {
                context: self.describe(),
                message: "working directory does not exist".to_string(),
            });
        }
        self.running = true;
        Ok(())
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandResult, ExecError> {
        if !self.running {
            return Err(ExecError::NotRunning(self.describe()));
        }
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.working_dir);
        run_with_timeout(cmd, "sh", timeout).await
    }

    async fn stop(&mut self) {
        self.running = false;
    }
}
