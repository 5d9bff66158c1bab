pub mod cleanup;
pub mod collapse;
pub mod latest;
pub mod repo;
pub mod restack;
pub mod resume;
pub mod squash;
pub mod unstack;
pub mod worktree;

use crate::config::{ConfigStore, RepoEntry};
use crate::errors::{CanopyError, Result};
use crate::git::{GitEngine, VcsPort};
use std::env;
use std::path::PathBuf;

/// Everything a per-repository command needs: the loaded config, the tracked
/// repository the working directory belongs to, and a git engine opened on
/// its root.
pub struct CommandContext {
    pub config: ConfigStore,
    pub repo_name: String,
    pub engine: GitEngine,
    pub cwd: PathBuf,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let cwd = env::current_dir()?;
        let config = ConfigStore::load()?;
        let repo = config.repo_containing(&cwd).ok_or_else(|| {
            CanopyError::precondition(
                "not inside a tracked repository; run 'canopy repo add' first",
            )
        })?;
        let repo_name = repo.name.clone();
        let engine = GitEngine::open(&repo.root)?;
        Ok(Self {
            config,
            repo_name,
            engine,
            cwd,
        })
    }

    pub fn repo(&self) -> Result<&RepoEntry> {
        self.config
            .repo(&self.repo_name)
            .ok_or_else(|| CanopyError::config(format!("repository '{}' vanished", self.repo_name)))
    }

    pub fn repo_mut(&mut self) -> Result<&mut RepoEntry> {
        let name = self.repo_name.clone();
        self.config
            .repo_mut(&name)
            .ok_or_else(|| CanopyError::config(format!("repository '{name}' vanished")))
    }

    /// The branch checked out where the command was invoked.
    pub fn current_branch(&self) -> Result<String> {
        self.engine.current_branch(&self.cwd)?.ok_or_else(|| {
            CanopyError::precondition("HEAD is detached; check out a branch first")
        })
    }

    pub fn worktree_of(&self, branch: &str) -> Result<PathBuf> {
        self.engine
            .list_worktrees()?
            .into_iter()
            .find(|wt| wt.branch.as_deref() == Some(branch))
            .map(|wt| wt.path)
            .ok_or_else(|| {
                CanopyError::precondition(format!("branch '{branch}' has no worktree"))
            })
    }
}
