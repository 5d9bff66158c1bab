use crate::errors::Result;
use crate::git::port::VcsPort;
use tracing::{debug, warn};

/// Tracks, per child branch, the commit at which it diverged from its parent.
///
/// The anchor is a named reference in the object store, so it both survives
/// history rewrites of the parent and keeps the fork-point commit from being
/// garbage-collected. It is the replay boundary for every fork-point-aware
/// rebase.
pub struct ForkPointTracker<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> ForkPointTracker<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn record(&self, child: &str, commit: &str) -> Result<()> {
        self.vcs.write_anchor(child, commit)
    }

    pub fn get(&self, child: &str) -> Result<Option<String>> {
        self.vcs.read_anchor(child)
    }

    /// Ignores absence.
    pub fn clear(&self, child: &str) -> Result<()> {
        self.vcs.delete_anchor(child)
    }

    /// Derive the fork point from the commits unique to `child`: the parent
    /// of the oldest such commit, or `parent`'s tip when the child has no
    /// commits of its own. Only valid while `parent` has not been rewritten
    /// since divergence.
    pub fn compute_fallback(&self, child: &str, parent: &str) -> Result<String> {
        let unique = self.vcs.commits_unique_to(child, parent)?;
        match unique.first() {
            None => self.vcs.resolve_commit(parent),
            Some(oldest) => match self.vcs.first_parent(oldest)? {
                Some(fork) => Ok(fork),
                // Unique history down to a root commit: fall back to the
                // merge base, which may still be a usable boundary.
                None => self.vcs.merge_base(parent, child),
            },
        }
    }

    /// The stored anchor when present, the fallback otherwise. The fallback
    /// is stale if the parent was rewritten since divergence, so its use is
    /// flagged to the user.
    pub fn resolve(&self, child: &str, parent: &str) -> Result<String> {
        if let Some(anchor) = self.get(child)? {
            debug!("fork point for '{}' from anchor: {}", child, anchor);
            return Ok(anchor);
        }
        let fork = self.compute_fallback(child, parent)?;
        warn!(
            "no fork-point anchor for '{}'; derived {} from commits unique to it \
             (incorrect if '{}' was rewritten since divergence)",
            child, &fork[..8.min(fork.len())], parent
        );
        Ok(fork)
    }
}
