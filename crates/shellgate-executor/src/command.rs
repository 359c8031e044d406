//! Child process construction.

use std::{path::PathBuf, process::Stdio};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use shellgate_core::CommandInvocation;
use tokio::process::Command;

/// Builder for the `sh -c` child process of one invocation.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Shell executable.
    pub shell: PathBuf,
    /// Flag that makes the shell read the command from its next argument.
    pub shell_arg: &'static str,
    pub invocation: CommandInvocation,
}

impl ShellCommand {
    #[must_use]
    pub fn new(shell: impl Into<PathBuf>, invocation: CommandInvocation) -> Self {
        Self {
            shell: shell.into(),
            shell_arg: "-c",
            invocation,
        }
    }

    /// Build the tokio command.
    ///
    /// The parent environment is inherited and the invocation's overrides
    /// are applied on top. stdin is closed; stdout and stderr are piped.
    #[must_use]
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(self.shell_arg)
            .arg(&self.invocation.command)
            .current_dir(&self.invocation.working_dir)
            .envs(self.invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn the command as the leader of a new process group so a timeout
    /// can terminate everything it started.
    ///
    /// # Errors
    /// Returns the OS error if the process could not be created.
    pub fn spawn(&self) -> std::io::Result<AsyncGroupChild> {
        self.build().group_spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_passes_command_verbatim() {
        let invocation = CommandInvocation::new("echo 'a b' | wc -c", "/workspace")
            .with_env("GH_TOKEN", "t");
        let cmd = ShellCommand::new("/bin/sh", invocation).build();
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "/bin/sh");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["-c", "echo 'a b' | wc -c"]);
        assert_eq!(
            std_cmd.get_current_dir(),
            Some(std::path::Path::new("/workspace"))
        );
        let envs: Vec<_> = std_cmd.get_envs().collect();
        assert!(envs.contains(&(
            std::ffi::OsStr::new("GH_TOKEN"),
            Some(std::ffi::OsStr::new("t"))
        )));
    }
}
