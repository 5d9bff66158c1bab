//! Scripted in-memory `VcsPort` for exercising the engines without a
//! repository. Every trait call is logged so tests can assert both behavior
//! and the absence of engine traffic.

use crate::errors::{CanopyError, Result};
use crate::git::port::{CommitInfo, RebaseOutcome, VcsPort, WorktreeInfo};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct FakeVcs {
    pub default_branch: RefCell<String>,
    worktrees: RefCell<Vec<WorktreeInfo>>,
    anchors: RefCell<HashMap<String, String>>,
    tips: RefCell<HashMap<String, String>>,
    unique: RefCell<HashMap<(String, String), Vec<String>>>,
    parents: RefCell<HashMap<String, Option<String>>>,
    merge_bases: RefCell<HashMap<(String, String), String>>,
    log: RefCell<HashMap<(String, String), Vec<CommitInfo>>>,
    heads: RefCell<HashMap<PathBuf, String>>,
    dirty: RefCell<HashSet<PathBuf>>,
    merged: RefCell<HashSet<String>>,
    gone: RefCell<HashSet<String>>,
    remote_refs: RefCell<HashSet<String>>,
    rebase_outcomes: RefCell<VecDeque<RebaseOutcome>>,
    paused: RefCell<HashMap<PathBuf, String>>,
    fail_commit: RefCell<bool>,
    fail_fetch: RefCell<bool>,
    calls: RefCell<Vec<String>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        let fake = Self::default();
        *fake.default_branch.borrow_mut() = "main".to_string();
        fake
    }

    // --- scripting ---

    pub fn add_worktree_entry(&self, branch: Option<&str>, path: &str, is_main: bool) {
        self.worktrees.borrow_mut().push(WorktreeInfo {
            path: PathBuf::from(path),
            branch: branch.map(str::to_string),
            is_main,
        });
    }

    pub fn set_tip(&self, rev: &str, commit: &str) {
        self.tips
            .borrow_mut()
            .insert(rev.to_string(), commit.to_string());
    }

    pub fn set_unique(&self, branch: &str, other: &str, hashes: &[&str]) {
        self.unique.borrow_mut().insert(
            (branch.to_string(), other.to_string()),
            hashes.iter().map(|h| h.to_string()).collect(),
        );
    }

    pub fn set_parent(&self, commit: &str, parent: Option<&str>) {
        self.parents
            .borrow_mut()
            .insert(commit.to_string(), parent.map(str::to_string));
    }

    pub fn set_merge_base(&self, a: &str, b: &str, base: &str) {
        self.merge_bases
            .borrow_mut()
            .insert((a.to_string(), b.to_string()), base.to_string());
    }

    pub fn set_commits_between(&self, from: &str, to: &str, subjects: &[&str]) {
        let commits = subjects
            .iter()
            .enumerate()
            .map(|(i, s)| CommitInfo {
                hash: format!("{s}-hash"),
                short_hash: format!("{s:.8}"),
                subject: s.to_string(),
                message: format!("{s}\n\nbody {i}"),
                author: "Test".to_string(),
                time: i as i64,
            })
            .collect();
        self.log
            .borrow_mut()
            .insert((from.to_string(), to.to_string()), commits);
    }

    pub fn set_dirty(&self, path: &str) {
        self.dirty.borrow_mut().insert(PathBuf::from(path));
    }

    pub fn set_merged(&self, branch: &str) {
        self.merged.borrow_mut().insert(branch.to_string());
    }

    pub fn set_gone(&self, branch: &str) {
        self.gone.borrow_mut().insert(branch.to_string());
    }

    pub fn add_remote_ref(&self, refname: &str) {
        self.remote_refs.borrow_mut().insert(refname.to_string());
    }

    pub fn script_rebase(&self, outcome: RebaseOutcome) {
        self.rebase_outcomes.borrow_mut().push_back(outcome);
    }

    pub fn set_paused(&self, path: &str, branch: &str) {
        self.paused
            .borrow_mut()
            .insert(PathBuf::from(path), branch.to_string());
    }

    pub fn fail_next_commit(&self) {
        *self.fail_commit.borrow_mut() = true;
    }

    pub fn fail_fetch(&self) {
        *self.fail_fetch.borrow_mut() = true;
    }

    // --- assertions ---

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn called(&self, needle: &str) -> bool {
        self.calls.borrow().iter().any(|c| {
            if needle.contains(char::is_whitespace) {
                c.contains(needle)
            } else {
                // A bare call name must match the logged call's name exactly,
                // so "commit" can't collide with "commits_between".
                c.split_whitespace().next() == Some(needle)
            }
        })
    }

    pub fn anchor(&self, branch: &str) -> Option<String> {
        self.anchors.borrow().get(branch).cloned()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn next_rebase(&self, worktree: &Path, branch: &str) -> RebaseOutcome {
        let outcome = self
            .rebase_outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(RebaseOutcome::Clean);
        if outcome == RebaseOutcome::Conflict {
            self.paused
                .borrow_mut()
                .insert(worktree.to_path_buf(), branch.to_string());
        }
        outcome
    }
}

impl VcsPort for FakeVcs {
    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        self.record("list_worktrees".to_string());
        Ok(self.worktrees.borrow().clone())
    }

    fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        _base: Option<&str>,
        _create: bool,
    ) -> Result<()> {
        self.record(format!("add_worktree {branch}"));
        self.worktrees.borrow_mut().push(WorktreeInfo {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
            is_main: false,
        });
        Ok(())
    }

    fn remove_worktree(&self, path: &Path) -> Result<()> {
        self.record(format!("remove_worktree {}", path.display()));
        self.worktrees.borrow_mut().retain(|wt| wt.path != path);
        Ok(())
    }

    fn default_branch(&self) -> Result<String> {
        self.record("default_branch".to_string());
        Ok(self.default_branch.borrow().clone())
    }

    fn branch_exists(&self, branch: &str) -> bool {
        self.tips.borrow().contains_key(branch)
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        self.record(format!("delete_branch {branch}"));
        self.tips.borrow_mut().remove(branch);
        Ok(())
    }

    fn has_ref(&self, refname: &str) -> bool {
        self.remote_refs.borrow().contains(refname)
    }

    fn fetch(&self, prune: bool) -> Result<()> {
        self.record(format!("fetch prune={prune}"));
        if *self.fail_fetch.borrow() {
            return Err(CanopyError::engine("no remote configured"));
        }
        Ok(())
    }

    fn ensure_fetch_refspec(&self) -> Result<()> {
        self.record("ensure_fetch_refspec".to_string());
        Ok(())
    }

    fn rebase(&self, worktree: &Path, target: &str) -> Result<RebaseOutcome> {
        self.record(format!("rebase {} onto {target}", worktree.display()));
        let branch = self
            .worktrees
            .borrow()
            .iter()
            .find(|wt| wt.path == worktree)
            .and_then(|wt| wt.branch.clone())
            .unwrap_or_default();
        Ok(self.next_rebase(worktree, &branch))
    }

    fn rebase_onto(
        &self,
        worktree: &Path,
        target: &str,
        after: &str,
        branch: &str,
    ) -> Result<RebaseOutcome> {
        self.record(format!("rebase_onto {branch} -> {target} after {after}"));
        Ok(self.next_rebase(worktree, branch))
    }

    fn rebase_continue(&self, worktree: &Path) -> Result<RebaseOutcome> {
        self.record(format!("rebase_continue {}", worktree.display()));
        let branch = self
            .paused
            .borrow()
            .get(worktree)
            .cloned()
            .unwrap_or_default();
        let outcome = self
            .rebase_outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(RebaseOutcome::Clean);
        if outcome == RebaseOutcome::Clean {
            self.paused.borrow_mut().remove(worktree);
        } else {
            self.paused
                .borrow_mut()
                .insert(worktree.to_path_buf(), branch);
        }
        Ok(outcome)
    }

    fn rebase_in_progress(&self, worktree: &Path) -> Result<bool> {
        Ok(self.paused.borrow().contains_key(worktree))
    }

    fn rebase_branch_name(&self, worktree: &Path) -> Result<Option<String>> {
        Ok(self.paused.borrow().get(worktree).cloned())
    }

    fn read_anchor(&self, branch: &str) -> Result<Option<String>> {
        Ok(self.anchors.borrow().get(branch).cloned())
    }

    fn write_anchor(&self, branch: &str, commit: &str) -> Result<()> {
        self.record(format!("write_anchor {branch}"));
        let resolved = self.resolve_commit(commit)?;
        self.anchors
            .borrow_mut()
            .insert(branch.to_string(), resolved);
        Ok(())
    }

    fn delete_anchor(&self, branch: &str) -> Result<()> {
        self.record(format!("delete_anchor {branch}"));
        self.anchors.borrow_mut().remove(branch);
        Ok(())
    }

    fn resolve_commit(&self, rev: &str) -> Result<String> {
        Ok(self
            .tips
            .borrow()
            .get(rev)
            .cloned()
            .unwrap_or_else(|| rev.to_string()))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.record(format!("merge_base {a} {b}"));
        self.merge_bases
            .borrow()
            .get(&(a.to_string(), b.to_string()))
            .cloned()
            .ok_or_else(|| CanopyError::engine(format!("no merge base scripted for {a}..{b}")))
    }

    fn commits_between(&self, from: &str, to: &str) -> Result<Vec<CommitInfo>> {
        self.record(format!("commits_between {from} {to}"));
        Ok(self
            .log
            .borrow()
            .get(&(from.to_string(), to.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn commits_unique_to(&self, branch: &str, other: &str) -> Result<Vec<String>> {
        self.record(format!("commits_unique_to {branch} {other}"));
        Ok(self
            .unique
            .borrow()
            .get(&(branch.to_string(), other.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn first_parent(&self, commit: &str) -> Result<Option<String>> {
        Ok(self.parents.borrow().get(commit).cloned().flatten())
    }

    fn branches_containing(&self, commit: &str) -> Result<Vec<String>> {
        self.record(format!("branches_containing {commit}"));
        Ok(vec![self.default_branch.borrow().clone()])
    }

    fn is_patch_merged(&self, branch: &str, upstream: &str) -> Result<bool> {
        self.record(format!("is_patch_merged {branch} {upstream}"));
        Ok(self.merged.borrow().contains(branch))
    }

    fn upstream_gone(&self, branch: &str) -> Result<bool> {
        self.record(format!("upstream_gone {branch}"));
        Ok(self.gone.borrow().contains(branch))
    }

    fn current_branch(&self, worktree: &Path) -> Result<Option<String>> {
        Ok(self
            .worktrees
            .borrow()
            .iter()
            .find(|wt| wt.path == worktree)
            .and_then(|wt| wt.branch.clone()))
    }

    fn head_commit(&self, worktree: &Path) -> Result<String> {
        self.heads
            .borrow()
            .get(worktree)
            .cloned()
            .ok_or_else(|| CanopyError::engine("no HEAD scripted"))
    }

    fn is_dirty(&self, worktree: &Path) -> Result<bool> {
        self.record(format!("is_dirty {}", worktree.display()));
        Ok(self.dirty.borrow().contains(worktree))
    }

    fn soft_reset(&self, worktree: &Path, target: &str) -> Result<()> {
        self.record(format!("soft_reset {} {target}", worktree.display()));
        Ok(())
    }

    fn fast_forward(&self, worktree: &Path, target: &str) -> Result<()> {
        self.record(format!("fast_forward {} {target}", worktree.display()));
        Ok(())
    }

    fn commit(&self, worktree: &Path, message: Option<&str>) -> Result<()> {
        self.record(format!(
            "commit {} msg={}",
            worktree.display(),
            message.unwrap_or("<editor>")
        ));
        if std::mem::take(&mut *self.fail_commit.borrow_mut()) {
            return Err(CanopyError::engine("index locked"));
        }
        Ok(())
    }
}
