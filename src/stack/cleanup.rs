use crate::config::StackEntry;
use crate::errors::Result;
use crate::git::port::VcsPort;
use crate::git::trunk_target;
use crate::stack::graph::StackGraph;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The branch's patches are all present on the trunk, even when the
    /// remote squashed or rebased them into different commits.
    Merged,
    /// The branch tracked a remote branch that was deleted.
    UpstreamGone,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Merged => write!(f, "merged"),
            RemovalReason::UpstreamGone => write!(f, "upstream gone"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub branch: String,
    pub worktree: PathBuf,
    pub reason: RemovalReason,
}

#[derive(Debug, Default)]
pub struct CleanupPlan {
    pub removals: Vec<Removal>,
    pub skipped_dirty: Vec<String>,
}

impl CleanupPlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }
}

/// Finds and removes worktrees whose branches already landed.
///
/// Cleanup runs in two phases so the caller can confirm in between:
/// `prepare` refreshes remote state, `plan` classifies every worktree
/// without touching anything, and `execute` carries the removals out,
/// pruning stack edges and anchors along the way. Dirty worktrees are
/// never removed, whatever their merge state.
pub struct CleanupEngine<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> CleanupEngine<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    /// Refresh remote-tracking refs, pruning the ones deleted upstream.
    /// Upstream-gone detection depends on the prune.
    pub fn prepare(&self) -> Result<()> {
        self.vcs.ensure_fetch_refspec()?;
        self.vcs.fetch(true)
    }

    pub fn plan(&self, cached_default: Option<&str>) -> Result<CleanupPlan> {
        let target = trunk_target(self.vcs, cached_default)?;
        let default = match cached_default {
            Some(d) => d.to_string(),
            None => self.vcs.default_branch()?,
        };

        let mut plan = CleanupPlan::default();
        for wt in self.vcs.list_worktrees()? {
            if wt.is_main {
                continue;
            }
            let Some(branch) = wt.branch else {
                continue;
            };
            if branch == default {
                continue;
            }
            if self.vcs.rebase_in_progress(&wt.path)? {
                debug!("'{}' has a rebase in flight, leaving it alone", branch);
                continue;
            }
            let reason = if self.vcs.upstream_gone(&branch)? {
                Some(RemovalReason::UpstreamGone)
            } else if self.vcs.is_patch_merged(&branch, &target)? {
                Some(RemovalReason::Merged)
            } else {
                None
            };
            let Some(reason) = reason else { continue };
            if self.vcs.is_dirty(&wt.path)? {
                plan.skipped_dirty.push(branch);
                continue;
            }
            plan.removals.push(Removal {
                branch,
                worktree: wt.path,
                reason,
            });
        }
        Ok(plan)
    }

    /// Returns the stack edges that survive the removals. A removed branch's
    /// children keep their worktrees and become stack roots; their anchors
    /// are cleared too, since an anchor without an edge only pins the dead
    /// branch's commits against gc.
    pub fn execute(&self, edges: &[StackEntry], plan: &CleanupPlan) -> Result<Vec<StackEntry>> {
        let mut remaining = edges.to_vec();
        for removal in &plan.removals {
            self.vcs.remove_worktree(&removal.worktree)?;
            self.vcs.delete_branch(&removal.branch)?;
            self.vcs.delete_anchor(&removal.branch)?;
            for child in StackGraph::new(&remaining).children_of(&removal.branch) {
                if let Err(err) = self.vcs.delete_anchor(child) {
                    warn!("could not clear anchor of freed child '{}': {}", child, err);
                }
            }
            remaining = StackGraph::new(&remaining).remove_by_child(&removal.branch);
            remaining = StackGraph::new(&remaining).remove_all_by_parent(&removal.branch);
            info!("removed '{}' ({})", removal.branch, removal.reason);
        }
        Ok(remaining)
    }
}
