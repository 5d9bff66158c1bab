pub mod engine;
pub mod port;

pub use engine::GitEngine;
pub use port::{CommitInfo, RebaseOutcome, VcsPort, WorktreeInfo};

use crate::errors::{CanopyError, Result};
use std::path::{Path, PathBuf};

/// Resolve the per-worktree git directory from a workdir path.
/// Handles both normal repos (.git is a directory) and worktrees (.git is a
/// file containing `gitdir: <path>`).
pub fn resolve_git_dir(workdir: &Path) -> Result<PathBuf> {
    let git_path = workdir.join(".git");
    if git_path.is_dir() {
        Ok(git_path)
    } else if git_path.is_file() {
        let content = std::fs::read_to_string(&git_path)
            .map_err(|e| CanopyError::config(format!("Failed to read .git file: {e}")))?;
        let gitdir = content
            .strip_prefix("gitdir: ")
            .map(|s| s.trim())
            .ok_or_else(|| CanopyError::config("Invalid .git file format"))?;
        let resolved = if Path::new(gitdir).is_absolute() {
            PathBuf::from(gitdir)
        } else {
            workdir.join(gitdir)
        };
        Ok(resolved)
    } else {
        Err(CanopyError::config(format!(
            "Not a git repository: {}",
            git_path.display()
        )))
    }
}

/// The trunk rebase target: the default branch's remote-tracking ref when one
/// exists, the local default branch otherwise (remote-less repositories).
pub fn trunk_target<V: VcsPort + ?Sized>(vcs: &V, cached_default: Option<&str>) -> Result<String> {
    let default = match cached_default {
        Some(name) => name.to_string(),
        None => vcs.default_branch()?,
    };
    let remote_ref = format!("refs/remotes/origin/{default}");
    if vcs.has_ref(&remote_ref) {
        Ok(format!("origin/{default}"))
    } else {
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_git_dir_normal_repo() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        fs::create_dir(&git_dir).unwrap();

        let result = resolve_git_dir(tmp.path()).unwrap();
        assert_eq!(result, git_dir);
    }

    #[test]
    fn test_resolve_git_dir_worktree_absolute() {
        let tmp = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let git_file = tmp.path().join(".git");
        fs::write(&git_file, format!("gitdir: {}\n", target.path().display())).unwrap();

        let result = resolve_git_dir(tmp.path()).unwrap();
        assert_eq!(result, target.path());
    }

    #[test]
    fn test_resolve_git_dir_worktree_relative() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("actual_git_dir");
        fs::create_dir(&target).unwrap();
        let git_file = tmp.path().join(".git");
        fs::write(&git_file, "gitdir: actual_git_dir").unwrap();

        let result = resolve_git_dir(tmp.path()).unwrap();
        assert_eq!(result, tmp.path().join("actual_git_dir"));
    }

    #[test]
    fn test_resolve_git_dir_not_a_repo() {
        let tmp = TempDir::new().unwrap();
        assert!(resolve_git_dir(tmp.path()).is_err());
    }

    #[test]
    fn test_resolve_git_dir_invalid_git_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".git"), "not a valid git file").unwrap();
        assert!(resolve_git_dir(tmp.path()).is_err());
    }
}
