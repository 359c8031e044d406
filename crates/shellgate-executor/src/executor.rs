//! Process executor with credential injection and a hard timeout.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use shellgate_core::{
    CommandExecutor, CommandInvocation, ExecutionResult, ExecutorError, TokenSource,
};

use crate::{
    command::ShellCommand,
    output::{read_stream, render_output},
    shell::default_shell,
};

/// Default working directory for commands.
pub const DEFAULT_SANDBOX_ROOT: &str = "/workspace";

/// Wall-clock budget for one command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Working directory used when the caller names none.
    pub sandbox_root: PathBuf,
    /// `HOME` for child processes, so CLI tools share one config location.
    pub home_dir: PathBuf,
    pub timeout: Duration,
    pub shell: PathBuf,
    /// Environment variables that receive the access token.
    pub token_env_vars: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from(DEFAULT_SANDBOX_ROOT),
            home_dir: PathBuf::from(DEFAULT_SANDBOX_ROOT),
            timeout: DEFAULT_TIMEOUT,
            shell: default_shell(),
            token_env_vars: vec!["GH_TOKEN".to_string(), "GITHUB_TOKEN".to_string()],
        }
    }
}

/// Runs shell commands in supervised child processes.
pub struct ProcessExecutor {
    tokens: Arc<dyn TokenSource>,
    config: ExecutorConfig,
}

impl ProcessExecutor {
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenSource>, config: ExecutorConfig) -> Self {
        Self { tokens, config }
    }

    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Build the invocation for `command` with the token and `HOME` injected.
    #[must_use]
    pub fn invocation(&self, command: &str, working_dir: PathBuf, token: &str) -> CommandInvocation {
        let mut invocation = CommandInvocation::new(command, working_dir);
        for var in &self.config.token_env_vars {
            invocation.set_env(var.as_str(), token);
        }
        invocation.set_env("HOME", self.config.home_dir.to_string_lossy());
        invocation
    }

    /// Run a prepared invocation to completion or timeout.
    ///
    /// The exit and the deadline race at one completion point: whichever
    /// finishes first drops the other, so each call has exactly one outcome.
    ///
    /// # Errors
    /// Returns `Spawn` if the process could not be created, `Timeout` if it
    /// outlived the configured budget, or `Io` if its pipes failed.
    pub async fn run(&self, invocation: CommandInvocation) -> Result<ExecutionResult, ExecutorError> {
        let cwd = invocation.working_dir.display().to_string();
        let mut child = ShellCommand::new(&self.config.shell, invocation)
            .spawn()
            .map_err(|e| {
                tracing::warn!(%cwd, "Failed to spawn command: {e}");
                ExecutorError::Spawn(e)
            })?;

        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout pipe was not captured"))?;
        let stderr = child
            .inner()
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr pipe was not captured"))?;

        let started = Instant::now();
        let completion = tokio::time::timeout(self.config.timeout, async {
            tokio::try_join!(child.wait(), read_stream(stdout), read_stream(stderr))
        })
        .await;

        match completion {
            Ok(Ok((status, stdout, stderr))) => {
                let stdout = String::from_utf8_lossy(&stdout);
                let stderr = String::from_utf8_lossy(&stderr);
                let exit_code = status.code();
                tracing::info!(
                    %cwd,
                    exit_code,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Command finished"
                );
                Ok(ExecutionResult {
                    output: render_output(exit_code, &stdout, &stderr),
                    exit_code,
                })
            }
            Ok(Err(e)) => {
                tracing::error!(%cwd, "Failed while waiting for command: {e}");
                if let Err(kill_err) = child.kill().await {
                    tracing::debug!("Process group already gone: {kill_err}");
                }
                Err(ExecutorError::Io(e))
            }
            Err(_) => {
                tracing::warn!(
                    %cwd,
                    timeout_secs = self.config.timeout.as_secs(),
                    "Command timed out, killing process group"
                );
                if let Err(kill_err) = child.kill().await {
                    tracing::debug!("Process group already gone: {kill_err}");
                }
                Err(ExecutorError::Timeout(self.config.timeout))
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    fn sandbox_root(&self) -> PathBuf {
        self.config.sandbox_root.clone()
    }

    async fn execute(
        &self,
        command: &str,
        working_dir: Option<PathBuf>,
    ) -> Result<ExecutionResult, ExecutorError> {
        let working_dir = working_dir.unwrap_or_else(|| self.config.sandbox_root.clone());
        let token = self.tokens.valid_token().await?;
        tracing::debug!(cwd = %working_dir.display(), command, "Executing command");
        self.run(self.invocation(command, working_dir, &token)).await
    }
}
