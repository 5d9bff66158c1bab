use crate::config::StackEntry;
use crate::errors::{CanopyError, Result};
use crate::git::port::{RebaseOutcome, VcsPort};
use crate::git::trunk_target;
use crate::stack::forkpoint::ForkPointTracker;
use crate::stack::graph::StackGraph;
use crate::stack::restack::PausedInfo;
use crate::stack::worktree_map;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CollapseReport {
    /// The parent branch that was folded out of the stack.
    pub absorbed: String,
    pub new_parent: Option<String>,
    pub removed_worktree: Option<PathBuf>,
    pub paused: Option<PausedInfo>,
}

/// Folds the current branch's parent out of the stack.
///
/// The branch is rebased onto its grandparent (or the trunk when there is
/// none) starting at the parent's fork point, so it keeps both the parent's
/// commits and its own. The parent's worktree is then removed. Refused when
/// the parent has other children, which would be orphaned.
pub struct CollapseEngine<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> CollapseEngine<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn run(
        &self,
        edges: &[StackEntry],
        branch: &str,
        cached_default: Option<&str>,
    ) -> Result<(Vec<StackEntry>, CollapseReport)> {
        let graph = StackGraph::new(edges);
        let parent = graph.parent_of(branch).ok_or_else(|| {
            CanopyError::precondition(format!("branch '{branch}' is not stacked on anything"))
        })?;
        let siblings: Vec<&str> = graph
            .children_of(parent)
            .into_iter()
            .filter(|c| *c != branch)
            .collect();
        if !siblings.is_empty() {
            return Err(CanopyError::precondition(format!(
                "cannot collapse '{parent}': it has other children ({})",
                siblings.join(", ")
            )));
        }
        let grandparent = graph.parent_of(parent);

        let worktrees = worktree_map(self.vcs)?;
        let branch_worktree = worktrees.get(branch).cloned().ok_or_else(|| {
            CanopyError::precondition(format!("branch '{branch}' has no worktree"))
        })?;
        let parent_worktree = worktrees.get(parent).cloned();
        if let Some(wt) = &parent_worktree {
            if self.vcs.is_dirty(wt)? {
                return Err(CanopyError::precondition(format!(
                    "worktree of '{parent}' has uncommitted changes"
                )));
            }
        }

        // A grandparent whose worktree is gone is no longer managed here;
        // the collapsed branch becomes a stack root.
        let new_parent = grandparent.filter(|gp| worktrees.contains_key(*gp));
        let target = match new_parent {
            Some(gp) => gp.to_string(),
            None => trunk_target(self.vcs, cached_default)?,
        };

        // Replay everything above the parent's fork point, which keeps the
        // parent's commits in the branch, onto the new base.
        let fork = match self.vcs.read_anchor(parent)? {
            Some(anchor) => anchor,
            None => ForkPointTracker::new(self.vcs).compute_fallback(parent, &target)?,
        };
        if self.vcs.rebase_onto(&branch_worktree, &target, &fork, branch)?
            == RebaseOutcome::Conflict
        {
            let report = CollapseReport {
                absorbed: parent.to_string(),
                new_parent: new_parent.map(str::to_string),
                removed_worktree: None,
                paused: Some(PausedInfo {
                    branch: branch.to_string(),
                    worktree: branch_worktree,
                }),
            };
            return Ok((edges.to_vec(), report));
        }

        match new_parent {
            Some(_) => {
                let tip = self.vcs.resolve_commit(&target)?;
                self.vcs.write_anchor(branch, &tip)?;
            }
            None => self.vcs.delete_anchor(branch)?,
        }
        self.vcs.delete_anchor(parent)?;

        let mut removed = None;
        if let Some(wt) = &parent_worktree {
            match self.vcs.remove_worktree(wt) {
                Ok(()) => removed = Some(wt.clone()),
                Err(err) => warn!(
                    "failed to remove worktree of '{}' at {}: {}",
                    parent,
                    wt.display(),
                    err
                ),
            }
        }
        info!(
            "collapsed '{}' out of the stack; '{}' now sits under {}",
            parent,
            branch,
            new_parent.unwrap_or("no parent")
        );

        let mut updated: Vec<StackEntry> = edges
            .iter()
            .filter(|e| {
                !(e.parent == parent && e.child == branch)
                    && !(Some(e.parent.as_str()) == grandparent && e.child == parent)
            })
            .cloned()
            .collect();
        if let Some(gp) = new_parent {
            updated.push(StackEntry {
                parent: gp.to_string(),
                child: branch.to_string(),
            });
        }
        let report = CollapseReport {
            absorbed: parent.to_string(),
            new_parent: new_parent.map(str::to_string),
            removed_worktree: removed,
            paused: None,
        };
        Ok((updated, report))
    }
}
