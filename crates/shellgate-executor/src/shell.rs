//! Shell resolution utilities.

use std::path::{Path, PathBuf};

/// POSIX shell used when nothing else is configured.
const FALLBACK_SHELL: &str = "/bin/sh";

/// Returns the POSIX shell that runs commands.
///
/// The search order is:
/// 1. `/bin/sh` when present.
/// 2. `sh` on the current PATH.
/// 3. The bare `/bin/sh` path, leaving the failure to spawn time.
#[must_use]
pub fn default_shell() -> PathBuf {
    let fallback = Path::new(FALLBACK_SHELL);
    if fallback.is_file() {
        return fallback.to_path_buf();
    }
    which::which("sh").unwrap_or_else(|_| fallback.to_path_buf())
}

/// Resolve an executable by name.
///
/// Absolute paths are accepted as-is when they point at a file; anything
/// else is looked up on the current PATH.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell_is_a_file() {
        assert!(default_shell().is_file());
    }

    #[tokio::test]
    async fn test_resolve_executable_path() {
        assert!(resolve_executable_path("sh").await.is_some());
        assert!(resolve_executable_path("").await.is_none());
        assert!(resolve_executable_path("/definitely/not/here").await.is_none());
    }
}
