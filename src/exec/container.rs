use super::{run_with_timeout, CommandResult, ExecError, ExecutionContext};
use crate::config::ContainerConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for container management commands (`rm`, `kill`).
const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// A long-running `podman`/`docker` container with the source tree mounted.
///
/// The container idles on `sleep infinity` and every command is an
/// `<engine> exec` into it, so build artifacts persist between functions.
#[derive(Debug, Clone)]
pub struct ContainerContext {
    engine: String,
    image: String,
    name: String,
    user: String,
    shell: String,
    host_dir: PathBuf,
    mount_point: String,
    start_timeout: Duration,
    running: bool,
}

impl ContainerContext {
    pub fn new(
        config: &ContainerConfig,
        host_dir: impl Into<PathBuf>,
        start_timeout: Duration,
    ) -> Self {
        Self {
            engine: config.engine.clone(),
            image: config.image.clone(),
            name: config.name.clone(),
            user: config.user.clone(),
            shell: config.shell.clone(),
            host_dir: host_dir.into(),
            mount_point: config.mount_point.clone(),
            start_timeout,
            running: false,
        }
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--user".to_string(),
            self.user.clone(),
            "-v".to_string(),
            format!("{}:{}", self.host_dir.display(), self.mount_point),
            self.image.clone(),
            "sleep".to_string(),
            "infinity".to_string(),
        ]
    }

    fn exec_args(&self, command: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            "-w".to_string(),
            self.mount_point.clone(),
            self.name.clone(),
            self.shell.clone(),
            "-c".to_string(),
            command.to_string(),
        ]
    }

    async fn engine(&self, args: &[String], timeout: Duration) -> Result<CommandResult, ExecError> {
        let mut cmd = Command::new(&self.engine);
        cmd.args(args);
        run_with_timeout(cmd, &self.engine, timeout).await
    }

    /// Best-effort management command; failures only get logged.
    async fn engine_quiet(&self, args: &[String]) {
        match self.engine(args, MANAGEMENT_TIMEOUT).await {
            Ok(result) if !result.success() => {
                tracing::debug!(
                    "`{} {}` exited with {}: {}",
                    self.engine,
                    args.join(" "),
                    result.exit_code,
                    result.stderr.trim()
                );
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("`{} {}` failed: {}", self.engine, args.join(" "), e),
        }
    }
}

#[async_trait]
impl ExecutionContext for ContainerContext {
    fn describe(&self) -> String {
        format!("{} container {}", self.engine, self.name)
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn start(&mut self) -> Result<(), ExecError> {
        // Clean start: a leftover container from a crashed run would clash on name.
        self.engine_quiet(&["rm".to_string(), "-f".to_string(), self.name.clone()])
            .await;

        tracing::info!(
            "Starting {} (image {}, {} mounted at {})",
            self.describe(),
            self.image,
            self.host_dir.display(),
            self.mount_point
        );

        let result = self
            .engine(&self.run_args(), self.start_timeout)
            .await
            .map_err(|e| ExecError::Start {
                context: self.describe(),
                message: e.to_string(),
            })?;

        if !result.success() {
            return Err(ExecError::Start {
                context: self.describe(),
                message: result.stderr.trim().to_string(),
            });
        }

        self.running = true;
        tracing::info!("Container {} started", self.name);
        Ok(())
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandResult, ExecError> {
        if !self.running {
            return Err(ExecError::NotRunning(self.describe()));
        }
        tracing::debug!("[{}] $ {}", self.name, command);
        self.engine(&self.exec_args(command), timeout).await
    }

    async fn stop(&mut self) {
        tracing::info!("Stopping {}", self.describe());
        self.engine_quiet(&["kill".to_string(), self.name.clone()]).await;
        self.engine_quiet(&["rm".to_string(), self.name.clone()]).await;
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(engine: &str) -> ContainerConfig {
        ContainerConfig {
            engine: engine.to_string(),
            ..ContainerConfig::default()
        }
    }

    #[test]
    fn test_run_args_mount_host_dir() {
        let ctx = ContainerContext::new(
            &config("podman"),
            "/tmp/zlib_tmp/zlib",
            Duration::from_secs(5),
        );
        assert_eq!(
            ctx.run_args(),
            vec![
                "run",
                "-d",
                "--name",
                "build-zlib",
                "--user",
                "root",
                "-v",
                "/tmp/zlib_tmp/zlib:/zlib",
                "build-zlib",
                "sleep",
                "infinity"
            ]
        );
    }

    #[test]
    fn test_exec_args_use_mount_as_workdir() {
        let ctx = ContainerContext::new(&config("docker"), "/src", Duration::from_secs(5));
        assert_eq!(
            ctx.exec_args("make tests_trees_bi_reverse"),
            vec![
                "exec",
                "-w",
                "/zlib",
                "build-zlib",
                "bash",
                "-c",
                "make tests_trees_bi_reverse"
            ]
        );
    }

    #[tokio::test]
    async fn test_start_fails_fast_without_engine() {
        let mut ctx = ContainerContext::new(
            &config("/definitely/not/a/container-engine"),
            "/src",
            Duration::from_secs(5),
        );
        let err = ctx.start().await.unwrap_err();
        assert!(matches!(err, ExecError::Start { .. }));
        assert!(!ctx.is_running());

        // teardown after a failed start is still safe, twice
        ctx.stop().await;
        ctx.stop().await;
        assert!(!ctx.is_running());
    }

    #[tokio::test]
    async fn test_exec_before_start_is_rejected() {
        let ctx = ContainerContext::new(&config("podman"), "/src", Duration::from_secs(5));
        let err = ctx.exec("true", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ExecError::NotRunning(_)));
    }
}
