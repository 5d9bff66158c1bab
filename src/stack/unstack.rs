use crate::config::StackEntry;
use crate::errors::{CanopyError, Result};
use crate::git::port::{RebaseOutcome, VcsPort};
use crate::git::trunk_target;
use crate::stack::graph::StackGraph;
use crate::stack::restack::PausedInfo;
use crate::stack::worktree_map;
use tracing::{info, warn};

#[derive(Debug)]
pub struct UnstackReport {
    /// Where the branch now sits.
    pub target: String,
    /// Children still stacked on the branch; their bases moved with it, so
    /// they need a restack pass.
    pub children_to_restack: Vec<String>,
    pub paused: Option<PausedInfo>,
}

/// Detaches a branch from its stack with a plain rebase onto the trunk. The
/// branch keeps every commit it sits on, including the parent's, since it is
/// meant to stand alone afterwards. The parent edge and the fork-point
/// anchor are dropped only once the rebase lands cleanly.
pub struct UnstackEngine<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> UnstackEngine<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn run(
        &self,
        edges: &[StackEntry],
        branch: &str,
        cached_default: Option<&str>,
    ) -> Result<(Vec<StackEntry>, UnstackReport)> {
        let graph = StackGraph::new(edges);
        let parent = graph.parent_of(branch).ok_or_else(|| {
            CanopyError::precondition(format!("branch '{branch}' is not stacked on anything"))
        })?;
        let children: Vec<String> = graph
            .children_of(branch)
            .into_iter()
            .map(str::to_string)
            .collect();

        let worktrees = worktree_map(self.vcs)?;
        let worktree = worktrees.get(branch).ok_or_else(|| {
            CanopyError::precondition(format!("branch '{branch}' has no worktree"))
        })?;

        if let Err(err) = self.vcs.fetch(false) {
            warn!("fetch failed, rebasing against local refs: {}", err);
        }
        let target = trunk_target(self.vcs, cached_default)?;

        match self.vcs.rebase(worktree, &target)? {
            RebaseOutcome::Clean => {
                self.vcs.delete_anchor(branch)?;
                info!("unstacked '{}' onto {}", branch, target);
                let updated: Vec<StackEntry> = edges
                    .iter()
                    .filter(|e| !(e.parent == parent && e.child == branch))
                    .cloned()
                    .collect();
                Ok((
                    updated,
                    UnstackReport {
                        target,
                        children_to_restack: children,
                        paused: None,
                    },
                ))
            }
            RebaseOutcome::Conflict => Ok((
                edges.to_vec(),
                UnstackReport {
                    target,
                    children_to_restack: children,
                    paused: Some(PausedInfo {
                        branch: branch.to_string(),
                        worktree: worktree.clone(),
                    }),
                },
            )),
        }
    }
}
