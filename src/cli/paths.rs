use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Find the git root directory by searching upward from `start`.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut path = start;

    loop {
        if path.join(".git").exists() {
            return Some(path.to_path_buf());
        }
        path = path.parent()?;
    }
}

/// Resolve the repository used by the `local` command.
pub fn resolve_repo_root(repo: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = repo {
        return path
            .canonicalize()
            .with_context(|| format!("Failed to canonicalize repository path: {}", path.display()));
    }

    let current = std::env::current_dir().context("Failed to get current directory")?;
    find_git_root(&current)
        .with_context(|| format!("No git repository found at or above {}", current.display()))
}
