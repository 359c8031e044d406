//! Supervised shell command executor.
//!
//! Provides:
//! - `ProcessExecutor` - Runs commands with injected credentials and a hard timeout
//! - `ShellCommand` - Builds the `sh -c` child process
//! - Output selection rules for finished commands
//! - Shell resolution utilities

pub mod command;
pub mod executor;
pub mod output;
pub mod shell;

pub use command::ShellCommand;
pub use executor::{DEFAULT_SANDBOX_ROOT, DEFAULT_TIMEOUT, ExecutorConfig, ProcessExecutor};
pub use output::render_output;
pub use shell::{default_shell, resolve_executable_path};
