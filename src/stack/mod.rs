pub mod cleanup;
pub mod collapse;
pub mod forkpoint;
pub mod graph;
pub mod restack;
pub mod squash;
pub mod unstack;

#[cfg(test)]
pub(crate) mod testkit;

pub use cleanup::{CleanupEngine, CleanupPlan, Removal, RemovalReason};
pub use collapse::CollapseEngine;
pub use forkpoint::ForkPointTracker;
pub use graph::StackGraph;
pub use restack::{ConflictRecovery, PausedInfo, RestackEngine, RestackReport};
pub use squash::{SquashEngine, SquashOptions, SquashOutcome};
pub use unstack::UnstackEngine;

use crate::errors::Result;
use crate::git::port::VcsPort;
use std::collections::HashMap;
use std::path::PathBuf;

/// Branch name to worktree path, for every checked-out branch.
pub(crate) fn worktree_map<V: VcsPort + ?Sized>(vcs: &V) -> Result<HashMap<String, PathBuf>> {
    Ok(vcs
        .list_worktrees()?
        .into_iter()
        .filter_map(|wt| wt.branch.map(|b| (b, wt.path)))
        .collect())
}
