use crate::errors::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A worktree as reported by the engine. `branch` is `None` when HEAD is
/// detached (e.g. mid-rebase) or for a bare main entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
    /// The repository's main (or bare) worktree: never removable, never the
    /// child of a stack edge in cleanup logic.
    pub is_main: bool,
}

/// One commit in an ordered log.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub subject: String,
    /// Full commit message, subject included
    pub message: String,
    pub author: String,
    /// Seconds since the epoch
    pub time: i64,
}

/// How a rebase (or rebase continuation) ended. Other failures are surfaced
/// as `CanopyError::Engine` with the engine's diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    Clean,
    Conflict,
}

/// The minimum contract the core requires from the version-control engine.
///
/// All history mutation is delegated through this port; the core only decides
/// what target and what commit range to feed it. Engines are generic over the
/// port so pure logic is testable without a repository.
pub trait VcsPort {
    // --- worktrees ---
    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>>;
    /// `create` makes a brand-new branch at `base` (HEAD when absent);
    /// otherwise an existing branch is checked out into the new worktree.
    fn add_worktree(&self, path: &Path, branch: &str, base: Option<&str>, create: bool)
        -> Result<()>;
    fn remove_worktree(&self, path: &Path) -> Result<()>;

    // --- repository-level queries ---
    fn default_branch(&self) -> Result<String>;
    fn branch_exists(&self, branch: &str) -> bool;
    fn delete_branch(&self, branch: &str) -> Result<()>;
    /// True when the fully-qualified ref (e.g. `refs/remotes/origin/main`)
    /// resolves.
    fn has_ref(&self, refname: &str) -> bool;
    fn fetch(&self, prune: bool) -> Result<()>;
    /// Bare repositories may lack a proper remote fetch mapping; install one
    /// so remote-tracking state is trustworthy.
    fn ensure_fetch_refspec(&self) -> Result<()>;

    // --- rebase ---
    fn rebase(&self, worktree: &Path, target: &str) -> Result<RebaseOutcome>;
    /// Replay only the commits of `branch` after `after` onto `target`
    /// (`git rebase --onto <target> <after> <branch>`).
    fn rebase_onto(
        &self,
        worktree: &Path,
        target: &str,
        after: &str,
        branch: &str,
    ) -> Result<RebaseOutcome>;
    fn rebase_continue(&self, worktree: &Path) -> Result<RebaseOutcome>;
    fn rebase_in_progress(&self, worktree: &Path) -> Result<bool>;
    /// Branch being rebased, read from the engine's rebase-state metadata
    /// (HEAD is detached while a rebase is paused).
    fn rebase_branch_name(&self, worktree: &Path) -> Result<Option<String>>;

    // --- fork-point anchor references ---
    fn read_anchor(&self, branch: &str) -> Result<Option<String>>;
    fn write_anchor(&self, branch: &str, commit: &str) -> Result<()>;
    /// Ignores absence.
    fn delete_anchor(&self, branch: &str) -> Result<()>;

    // --- history queries ---
    fn resolve_commit(&self, rev: &str) -> Result<String>;
    fn merge_base(&self, a: &str, b: &str) -> Result<String>;
    /// Commits reachable from `to` but not `from`, oldest first.
    fn commits_between(&self, from: &str, to: &str) -> Result<Vec<CommitInfo>>;
    /// Commit hashes reachable from `branch` but not `other`, oldest first.
    fn commits_unique_to(&self, branch: &str, other: &str) -> Result<Vec<String>>;
    fn first_parent(&self, commit: &str) -> Result<Option<String>>;
    fn branches_containing(&self, commit: &str) -> Result<Vec<String>>;
    /// Patch-equivalence: true when every commit of `branch` is already
    /// present in `upstream` by content, even if no hash matches.
    fn is_patch_merged(&self, branch: &str, upstream: &str) -> Result<bool>;
    /// True when the branch's upstream tracking ref is marked gone.
    fn upstream_gone(&self, branch: &str) -> Result<bool>;

    // --- worktree-local operations ---
    fn current_branch(&self, worktree: &Path) -> Result<Option<String>>;
    fn head_commit(&self, worktree: &Path) -> Result<String>;
    fn is_dirty(&self, worktree: &Path) -> Result<bool>;
    fn soft_reset(&self, worktree: &Path, target: &str) -> Result<()>;
    fn fast_forward(&self, worktree: &Path, target: &str) -> Result<()>;
    /// Commit staged changes; `None` opens the user's editor.
    fn commit(&self, worktree: &Path, message: Option<&str>) -> Result<()>;
}
