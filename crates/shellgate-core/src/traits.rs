//! Core traits and the shared error taxonomy.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Session identifier, minted by the transport when a stream opens.
pub type SessionId = Uuid;

/// Credential error.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// No refresh token is configured and the access token has expired.
    #[error("Credential unavailable: access token expired and no refresh token is configured")]
    Unavailable,
    /// The identity provider rejected the refresh.
    #[error("Credential refresh failed: {code}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    RefreshFailed {
        code: String,
        description: Option<String>,
    },
    /// The refresh request could not be sent or its response decoded.
    #[error("Credential refresh request failed: {0}")]
    Request(String),
}

/// Executor error.
///
/// Non-zero exit codes are not errors; they come back as an
/// [`ExecutionResult`] carrying the command's own output.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("Command timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured outcome of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Text returned to the caller, already selected from stdout/stderr.
    pub output: String,
    /// Exit code, or `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Source of a currently valid bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a token that is valid for at least the refresh-ahead window,
    /// refreshing it first if needed.
    async fn valid_token(&self) -> Result<String, CredentialError>;
}

/// Runs shell commands on behalf of a session.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Directory used when the caller does not name one.
    fn sandbox_root(&self) -> PathBuf;

    /// Run `command` in `working_dir` (or the sandbox root).
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<PathBuf>,
    ) -> Result<ExecutionResult, ExecutorError>;
}
