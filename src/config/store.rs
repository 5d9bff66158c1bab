use crate::errors::{CanopyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A directed edge in a repository's stack forest.
///
/// Invariant: a branch appears as `child` in at most one edge per repository,
/// so each repository's edges form a forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    pub parent: String,
    pub child: String,
}

/// A tracked repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
    /// Unique key across the config
    pub name: String,
    /// Remote URL recorded at adoption time
    pub remote: String,
    /// Absolute path to the main worktree (or the bare repository)
    pub root: PathBuf,
    pub bare: bool,
    /// Cached default-branch name; refreshed by `canopy latest`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub stacks: Vec<StackEntry>,
    pub added_at: DateTime<Utc>,
}

impl RepoEntry {
    /// Where a worktree for `branch` lives under this repository.
    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        let leaf = branch.replace('/', "-");
        if self.bare {
            self.root.join(leaf)
        } else {
            self.root.join(".worktrees").join(leaf)
        }
    }
}

/// The whole persisted document. Loaded once per command, threaded through as
/// a value, and saved once at the end of a composed sequence. Saves are
/// full-document rewrites.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigStore {
    #[serde(default)]
    pub repos: Vec<RepoEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl ConfigStore {
    /// Default config file location.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| CanopyError::config("Could not determine config directory"))?;
        Ok(base.join("canopy").join("config.json"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                repos: Vec::new(),
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)
            .map_err(|e| CanopyError::config(format!("Failed to read config file: {e}")))?;

        let mut store: ConfigStore = serde_json::from_str(&content)
            .map_err(|e| CanopyError::config(format!("Failed to parse config file: {e}")))?;
        store.path = path.to_path_buf();
        Ok(store)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| CanopyError::config(format!("Failed to create config dir: {e}")))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CanopyError::config(format!("Failed to serialize config: {e}")))?;

        fs::write(&self.path, content)
            .map_err(|e| CanopyError::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    pub fn repo(&self, name: &str) -> Option<&RepoEntry> {
        self.repos.iter().find(|r| r.name == name)
    }

    pub fn repo_mut(&mut self, name: &str) -> Option<&mut RepoEntry> {
        self.repos.iter_mut().find(|r| r.name == name)
    }

    /// Find the tracked repository whose root contains `path`. Worktrees are
    /// created under the repository root, so a prefix match is sufficient.
    pub fn repo_containing(&self, path: &Path) -> Option<&RepoEntry> {
        let canon = path.canonicalize().ok()?;
        self.repos
            .iter()
            .filter(|r| {
                r.root
                    .canonicalize()
                    .map(|root| canon.starts_with(root))
                    .unwrap_or(false)
            })
            // Prefer the deepest root in case one tracked repo nests another
            .max_by_key(|r| r.root.components().count())
    }

    pub fn add_repo(&mut self, entry: RepoEntry) -> Result<()> {
        if self.repo(&entry.name).is_some() {
            return Err(CanopyError::precondition(format!(
                "Repository '{}' is already tracked",
                entry.name
            )));
        }
        self.repos.push(entry);
        Ok(())
    }

    pub fn remove_repo(&mut self, name: &str) -> Result<RepoEntry> {
        let idx = self
            .repos
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| {
                CanopyError::precondition(format!("Repository '{name}' is not tracked"))
            })?;
        Ok(self.repos.remove(idx))
    }
}
