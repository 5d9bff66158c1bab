use crate::config::StackEntry;
use crate::errors::{CanopyError, Result};
use crate::git::port::{RebaseOutcome, VcsPort};
use crate::git::trunk_target;
use crate::stack::forkpoint::ForkPointTracker;
use crate::stack::graph::StackGraph;
use crate::stack::worktree_map;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Rebase paused on conflicts, waiting for the user to resolve and continue.
#[derive(Debug, Clone)]
pub struct PausedInfo {
    pub branch: String,
    pub worktree: PathBuf,
}

/// What a restack pass did. `detached` lists branches that were rebased onto
/// the trunk because their parent's worktree is gone; `untracked` lists
/// branches whose parent vanished during a resume, where only the tracking
/// was dropped. The caller removes stack edges for both. `pending` holds the
/// branches a conflict left unvisited; they need another restack pass.
#[derive(Debug, Default)]
pub struct RestackReport {
    pub restacked: Vec<String>,
    pub skipped: Vec<String>,
    pub detached: Vec<String>,
    pub untracked: Vec<String>,
    pub pending: Vec<String>,
    pub paused: Option<PausedInfo>,
}

/// Replays stacked branches onto their rewritten parents.
///
/// Each branch is rebased with `--onto <parent> <fork-point>`, so only the
/// commits the branch introduced move; the parent's old commits are never
/// replayed even after the parent was amended or squashed. Children are
/// visited depth first, left to right, each against the tip its parent just
/// landed on. A conflict pauses the whole pass where it stands.
pub struct RestackEngine<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> RestackEngine<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn run(
        &self,
        edges: &[StackEntry],
        branch: &str,
        cached_default: Option<&str>,
    ) -> Result<RestackReport> {
        let graph = StackGraph::new(edges);
        if graph.parent_of(branch).is_none() {
            return Err(CanopyError::precondition(format!(
                "branch '{branch}' is not stacked on anything"
            )));
        }

        let worktrees = worktree_map(self.vcs)?;
        let worklist = vec![branch.to_string()];
        let mut report = RestackReport::default();
        process_worklist(
            self.vcs,
            &graph,
            &worktrees,
            worklist,
            &mut report,
            cached_default,
        )?;
        Ok(report)
    }
}

/// Resumes a conflict-paused restack: finishes the in-flight rebase, then
/// picks the traversal back up at the paused branch's children.
pub struct ConflictRecovery<'a, V: VcsPort + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: VcsPort + ?Sized> ConflictRecovery<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn resume(
        &self,
        edges: &[StackEntry],
        cached_default: Option<&str>,
    ) -> Result<RestackReport> {
        let all = self.vcs.list_worktrees()?;
        let mut paused = None;
        for wt in &all {
            if self.vcs.rebase_in_progress(&wt.path)? {
                paused = Some(wt.clone());
                break;
            }
        }
        let wt = paused.ok_or_else(|| {
            CanopyError::precondition("no paused rebase found in any worktree")
        })?;
        let branch = match self.vcs.rebase_branch_name(&wt.path)? {
            Some(b) => b,
            None => wt.branch.clone().ok_or_else(|| {
                CanopyError::precondition(format!(
                    "cannot determine which branch is being rebased in {}",
                    wt.path.display()
                ))
            })?,
        };

        let mut report = RestackReport::default();
        if self.vcs.rebase_continue(&wt.path)? == RebaseOutcome::Conflict {
            report.paused = Some(PausedInfo {
                branch,
                worktree: wt.path,
            });
            return Ok(report);
        }

        let worktrees: HashMap<String, PathBuf> = all
            .into_iter()
            .filter_map(|w| w.branch.map(|b| (b, w.path)))
            .collect();
        let graph = StackGraph::new(edges);
        if let Some(parent) = graph.parent_of(&branch) {
            if worktrees.contains_key(parent) {
                let tip = self.vcs.resolve_commit(parent)?;
                self.vcs.write_anchor(&branch, &tip)?;
            } else {
                // The rebase already ran; only the tracking is stale.
                self.vcs.delete_anchor(&branch)?;
                report.untracked.push(branch.clone());
            }
        }
        report.restacked.push(branch.clone());
        info!("resumed rebase of '{}' completed", branch);

        let worklist: Vec<String> = graph
            .children_of(&branch)
            .into_iter()
            .rev()
            .map(str::to_string)
            .collect();
        process_worklist(
            self.vcs,
            &graph,
            &worktrees,
            worklist,
            &mut report,
            cached_default,
        )?;
        Ok(report)
    }
}

fn process_worklist<V: VcsPort + ?Sized>(
    vcs: &V,
    graph: &StackGraph,
    worktrees: &HashMap<String, PathBuf>,
    mut worklist: Vec<String>,
    report: &mut RestackReport,
    cached_default: Option<&str>,
) -> Result<()> {
    let tracker = ForkPointTracker::new(vcs);
    while let Some(current) = worklist.pop() {
        let Some(parent) = graph.parent_of(&current) else {
            continue;
        };
        let Some(worktree) = worktrees.get(&current) else {
            warn!("branch '{}' has no worktree; skipping its subtree", current);
            report.skipped.push(current);
            continue;
        };

        if !worktrees.contains_key(parent) {
            // Parent worktree removed out from under the stack. Reparent
            // the child onto the trunk and drop its edge.
            let target = trunk_target(vcs, cached_default)?;
            warn!(
                "parent '{}' of '{}' has no worktree; rebasing onto {}",
                parent, current, target
            );
            match vcs.rebase(worktree, &target)? {
                RebaseOutcome::Clean => {
                    tracker.clear(&current)?;
                    report.detached.push(current.clone());
                    report.restacked.push(current.clone());
                }
                RebaseOutcome::Conflict => {
                    report.paused = Some(PausedInfo {
                        branch: current,
                        worktree: worktree.clone(),
                    });
                    report.pending = drain_pending(&mut worklist);
                    return Ok(());
                }
            }
        } else {
            let fork = tracker.resolve(&current, parent)?;
            match vcs.rebase_onto(worktree, parent, &fork, &current)? {
                RebaseOutcome::Clean => {
                    let tip = vcs.resolve_commit(parent)?;
                    tracker.record(&current, &tip)?;
                    info!("restacked '{}' onto '{}'", current, parent);
                    report.restacked.push(current.clone());
                }
                RebaseOutcome::Conflict => {
                    report.paused = Some(PausedInfo {
                        branch: current,
                        worktree: worktree.clone(),
                    });
                    report.pending = drain_pending(&mut worklist);
                    return Ok(());
                }
            }
        }

        for child in graph.children_of(&current).into_iter().rev() {
            worklist.push(child.to_string());
        }
    }
    Ok(())
}

/// Worklist entries a conflict left behind, in traversal order. `continue`
/// only resumes the paused branch's own subtree, so these need a fresh
/// restack pass.
fn drain_pending(worklist: &mut Vec<String>) -> Vec<String> {
    let mut rest = std::mem::take(worklist);
    rest.reverse();
    rest
}
