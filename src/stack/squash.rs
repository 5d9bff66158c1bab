use crate::config::StackEntry;
use crate::errors::{CanopyError, Result};
use crate::git::port::{CommitInfo, VcsPort};
use crate::git::trunk_target;
use crate::stack::graph::StackGraph;
use crate::stack::worktree_map;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct SquashOptions {
    /// Commit message for the squashed commit. `None` opens the editor
    /// unless `use_first_commit_message` is set.
    pub message: Option<String>,
    pub use_first_commit_message: bool,
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct SquashDryRun {
    pub base: String,
    pub commits: Vec<CommitInfo>,
    /// Other branches already containing the squash base. Squashing rewrites
    /// history they may share.
    pub containing_branches: Vec<String>,
}

#[derive(Debug)]
pub enum SquashOutcome {
    /// A single commit needs no squashing.
    NoOp,
    Squashed { count: usize },
    DryRun(SquashDryRun),
}

/// Compresses a branch's own commits into one.
///
/// The base is the merge base with the live parent for a stacked branch,
/// with the trunk otherwise, so parent commits are never folded in. The
/// squash itself is a soft reset to the base followed by one commit; if
/// that commit fails, the work is still staged and recoverable by hand.
pub struct SquashEngine<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> SquashEngine<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn run(
        &self,
        edges: &[StackEntry],
        branch: &str,
        worktree: &Path,
        opts: &SquashOptions,
        cached_default: Option<&str>,
    ) -> Result<SquashOutcome> {
        if self.vcs.is_dirty(worktree)? {
            return Err(CanopyError::precondition(
                "worktree has uncommitted changes; commit or stash them first",
            ));
        }
        let graph = StackGraph::new(edges);
        let worktrees = worktree_map(self.vcs)?;
        let base_ref = match graph
            .parent_of(branch)
            .filter(|p| worktrees.contains_key(*p))
        {
            Some(parent) => parent.to_string(),
            None => {
                if let Err(err) = self.vcs.fetch(false) {
                    warn!("fetch before squash failed, using local refs: {err}");
                }
                trunk_target(self.vcs, cached_default)?
            }
        };
        let base = self.vcs.merge_base(&base_ref, branch)?;

        let commits = self.vcs.commits_between(&base, branch)?;
        if commits.is_empty() {
            return Err(CanopyError::precondition(format!(
                "branch '{branch}' has no commits of its own to squash"
            )));
        }
        if commits.len() == 1 {
            return Ok(SquashOutcome::NoOp);
        }

        if opts.dry_run {
            let containing_branches: Vec<String> = self
                .vcs
                .branches_containing(&base)?
                .into_iter()
                .filter(|b| b != branch)
                .collect();
            return Ok(SquashOutcome::DryRun(SquashDryRun {
                base,
                commits,
                containing_branches,
            }));
        }

        let message = match (&opts.message, opts.use_first_commit_message) {
            (Some(m), _) => Some(m.clone()),
            (None, true) => Some(commits[0].message.clone()),
            (None, false) => None,
        };
        let count = commits.len();
        self.vcs.soft_reset(worktree, &base)?;
        self.vcs
            .commit(worktree, message.as_deref())
            .map_err(|err| {
                CanopyError::recoverable(format!(
                    "squash commit failed ({err}); your changes are still staged, \
                     commit them manually to finish"
                ))
            })?;
        info!("squashed {} commits on '{}'", count, branch);
        Ok(SquashOutcome::Squashed { count })
    }
}
