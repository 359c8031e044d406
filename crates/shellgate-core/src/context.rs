//! Per-call command invocation.

use std::path::{Path, PathBuf};

/// One shell command to run, where to run it and what to add to its
/// environment.
///
/// Created per tool call and consumed by a single executor call. The
/// parent process environment is inherited; `env` only lists overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Raw shell text, passed verbatim to `sh -c`.
    pub command: String,

    /// Working directory for the child process.
    pub working_dir: PathBuf,

    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl CommandInvocation {
    /// Create an invocation with no environment overrides.
    #[must_use]
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Add an environment override. Later values for the same key win.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_env(key, value);
        self
    }

    /// Set an environment override in place.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.env.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.env.push((key, value));
        }
    }

    /// Get an environment override by key.
    #[must_use]
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_env_overwrites_existing_key() {
        let inv = CommandInvocation::new("true", "/workspace")
            .with_env("HOME", "/tmp")
            .with_env("HOME", "/workspace");

        assert_eq!(inv.env.len(), 1);
        assert_eq!(inv.get_env("HOME"), Some("/workspace"));
        assert_eq!(inv.get_env("GH_TOKEN"), None);
    }
}
