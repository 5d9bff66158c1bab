use crate::errors::{CanopyError, Result};
use crate::git::port::{CommitInfo, RebaseOutcome, VcsPort, WorktreeInfo};
use crate::git::resolve_git_dir;
use git2::{Oid, Repository};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

const ANCHOR_NAMESPACE: &str = "refs/canopy/fork-points/";

/// Production `VcsPort`: libgit2 for object-store reads and writes, the `git`
/// binary for everything that mutates a worktree or depends on porcelain
/// behavior. All parsing of git's textual output lives in this module.
pub struct GitEngine {
    repo: Repository,
    root: PathBuf,
}

impl GitEngine {
    /// Open the engine on a repository root (main worktree or bare path).
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .map_err(|e| CanopyError::config(format!("Not a git repository: {e}")))?;
        Ok(Self {
            repo,
            root: path.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_git(&self, dir: &Path, args: &[&str]) -> Result<std::process::Output> {
        debug!("git -C {} {}", dir.display(), args.join(" "));
        Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map_err(|e| CanopyError::engine(format!("failed to run git: {e}")))
    }

    /// Run git and require success, surfacing the engine's diagnostics
    /// verbatim on failure.
    fn run_git_ok(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let out = self.run_git(dir, args)?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let diag = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&out.stdout).into_owned()
            } else {
                stderr.into_owned()
            };
            Err(CanopyError::engine(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                diag.trim()
            )))
        }
    }

    fn anchor_ref(branch: &str) -> String {
        format!("{ANCHOR_NAMESPACE}{branch}")
    }

    /// A failed rebase invocation that left the sentinel behind is a
    /// conflict; anything else is an engine failure.
    fn classify_rebase(&self, worktree: &Path, out: std::process::Output) -> Result<RebaseOutcome> {
        if out.status.success() {
            return Ok(RebaseOutcome::Clean);
        }
        if self.rebase_in_progress(worktree)? {
            return Ok(RebaseOutcome::Conflict);
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        Err(CanopyError::engine(format!(
            "rebase failed: {}",
            stderr.trim()
        )))
    }
}

impl VcsPort for GitEngine {
    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        let text = self.run_git_ok(&self.root, &["worktree", "list", "--porcelain"])?;

        let mut worktrees: Vec<WorktreeInfo> = Vec::new();
        let mut current: Option<WorktreeInfo> = None;

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("worktree ") {
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                current = Some(WorktreeInfo {
                    path: PathBuf::from(rest),
                    branch: None,
                    is_main: false,
                });
            } else if let Some(rest) = line.strip_prefix("branch ") {
                if let Some(wt) = current.as_mut() {
                    wt.branch = Some(
                        rest.strip_prefix("refs/heads/").unwrap_or(rest).to_string(),
                    );
                }
            }
            // `detached` and `bare` lines leave branch as None
        }
        if let Some(wt) = current.take() {
            worktrees.push(wt);
        }

        // git lists the main (or bare) worktree first
        if let Some(first) = worktrees.first_mut() {
            first.is_main = true;
        }
        Ok(worktrees)
    }

    fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        base: Option<&str>,
        create: bool,
    ) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let path_str = path.to_string_lossy();
        if create {
            let mut args = vec!["worktree", "add", "-b", branch, path_str.as_ref()];
            if let Some(base) = base {
                args.push(base);
            }
            self.run_git_ok(&self.root, &args)?;
        } else {
            self.run_git_ok(&self.root, &["worktree", "add", path_str.as_ref(), branch])?;
        }
        debug!("created worktree for '{}' at {}", branch, path.display());
        Ok(())
    }

    fn remove_worktree(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_git_ok(&self.root, &["worktree", "remove", path_str.as_ref()])?;
        Ok(())
    }

    fn default_branch(&self) -> Result<String> {
        if let Ok(head) = self.repo.find_reference("refs/remotes/origin/HEAD") {
            if let Some(target) = head.symbolic_target() {
                if let Some(name) = target.strip_prefix("refs/remotes/origin/") {
                    return Ok(name.to_string());
                }
            }
        }

        for candidate in ["main", "master"] {
            if self
                .repo
                .find_branch(candidate, git2::BranchType::Local)
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }

        Err(CanopyError::branch(
            "Could not determine the default branch",
        ))
    }

    fn branch_exists(&self, branch: &str) -> bool {
        self.repo
            .find_branch(branch, git2::BranchType::Local)
            .is_ok()
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run_git_ok(&self.root, &["branch", "-D", branch])?;
        Ok(())
    }

    fn has_ref(&self, refname: &str) -> bool {
        self.repo.find_reference(refname).is_ok()
    }

    fn fetch(&self, prune: bool) -> Result<()> {
        let mut args = vec!["fetch"];
        if prune {
            args.push("--prune");
        }
        args.push("origin");
        self.run_git_ok(&self.root, &args)?;
        Ok(())
    }

    fn ensure_fetch_refspec(&self) -> Result<()> {
        let out = self.run_git(&self.root, &["config", "--get-all", "remote.origin.fetch"])?;
        let current = String::from_utf8_lossy(&out.stdout);
        if current.contains("refs/remotes/origin/") {
            return Ok(());
        }
        debug!("installing remote fetch refspec for {}", self.root.display());
        self.run_git_ok(
            &self.root,
            &[
                "config",
                "--add",
                "remote.origin.fetch",
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )?;
        Ok(())
    }

    fn rebase(&self, worktree: &Path, target: &str) -> Result<RebaseOutcome> {
        let out = self.run_git(worktree, &["rebase", target])?;
        self.classify_rebase(worktree, out)
    }

    fn rebase_onto(
        &self,
        worktree: &Path,
        target: &str,
        after: &str,
        branch: &str,
    ) -> Result<RebaseOutcome> {
        let out = self.run_git(worktree, &["rebase", "--onto", target, after, branch])?;
        self.classify_rebase(worktree, out)
    }

    fn rebase_continue(&self, worktree: &Path) -> Result<RebaseOutcome> {
        // GIT_EDITOR=true keeps the continuation non-interactive; the replayed
        // commit keeps its original message.
        let out = Command::new("git")
            .arg("-C")
            .arg(worktree)
            .args(["rebase", "--continue"])
            .env("GIT_EDITOR", "true")
            .output()
            .map_err(|e| CanopyError::engine(format!("failed to run git: {e}")))?;
        self.classify_rebase(worktree, out)
    }

    fn rebase_in_progress(&self, worktree: &Path) -> Result<bool> {
        let git_dir = match resolve_git_dir(worktree) {
            Ok(dir) => dir,
            // Bare entries have no `.git`; nothing can be paused there.
            Err(_) => return Ok(false),
        };
        Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
    }

    fn rebase_branch_name(&self, worktree: &Path) -> Result<Option<String>> {
        let git_dir = resolve_git_dir(worktree)?;
        for state_dir in ["rebase-merge", "rebase-apply"] {
            let head_name = git_dir.join(state_dir).join("head-name");
            if head_name.is_file() {
                let raw = std::fs::read_to_string(&head_name)?;
                let name = raw.trim();
                return Ok(Some(
                    name.strip_prefix("refs/heads/").unwrap_or(name).to_string(),
                ));
            }
        }
        Ok(None)
    }

    fn read_anchor(&self, branch: &str) -> Result<Option<String>> {
        match self.repo.find_reference(&Self::anchor_ref(branch)) {
            Ok(reference) => Ok(reference.target().map(|oid| oid.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(CanopyError::Git(e)),
        }
    }

    fn write_anchor(&self, branch: &str, commit: &str) -> Result<()> {
        let oid = self
            .repo
            .revparse_single(commit)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(CanopyError::Git)?
            .id();
        self.repo
            .reference(&Self::anchor_ref(branch), oid, true, "canopy: fork point")
            .map_err(CanopyError::Git)?;
        debug!("anchor for '{}' -> {}", branch, oid);
        Ok(())
    }

    fn delete_anchor(&self, branch: &str) -> Result<()> {
        match self.repo.find_reference(&Self::anchor_ref(branch)) {
            Ok(mut reference) => {
                reference.delete().map_err(CanopyError::Git)?;
                Ok(())
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(CanopyError::Git(e)),
        }
    }

    fn resolve_commit(&self, rev: &str) -> Result<String> {
        let commit = self
            .repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| CanopyError::branch(format!("Could not resolve '{rev}': {e}")))?;
        Ok(commit.id().to_string())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let a_oid = Oid::from_str(&self.resolve_commit(a)?).map_err(CanopyError::Git)?;
        let b_oid = Oid::from_str(&self.resolve_commit(b)?).map_err(CanopyError::Git)?;
        let base = self.repo.merge_base(a_oid, b_oid).map_err(CanopyError::Git)?;
        Ok(base.to_string())
    }

    fn commits_between(&self, from: &str, to: &str) -> Result<Vec<CommitInfo>> {
        let from_oid = Oid::from_str(&self.resolve_commit(from)?).map_err(CanopyError::Git)?;
        let to_oid = Oid::from_str(&self.resolve_commit(to)?).map_err(CanopyError::Git)?;

        let mut revwalk = self.repo.revwalk().map_err(CanopyError::Git)?;
        revwalk.push(to_oid).map_err(CanopyError::Git)?;
        revwalk.hide(from_oid).map_err(CanopyError::Git)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(CanopyError::Git)?;
            let commit = self.repo.find_commit(oid).map_err(CanopyError::Git)?;
            commits.push(CommitInfo {
                hash: oid.to_string(),
                short_hash: oid.to_string()[..8].to_string(),
                subject: commit.summary().unwrap_or("").to_string(),
                message: commit.message().unwrap_or("").to_string(),
                author: commit.author().name().unwrap_or("").to_string(),
                time: commit.time().seconds(),
            });
        }
        commits.reverse();
        Ok(commits)
    }

    fn commits_unique_to(&self, branch: &str, other: &str) -> Result<Vec<String>> {
        let branch_oid = Oid::from_str(&self.resolve_commit(branch)?).map_err(CanopyError::Git)?;
        let other_oid = Oid::from_str(&self.resolve_commit(other)?).map_err(CanopyError::Git)?;

        let mut revwalk = self.repo.revwalk().map_err(CanopyError::Git)?;
        revwalk.push(branch_oid).map_err(CanopyError::Git)?;
        revwalk.hide(other_oid).map_err(CanopyError::Git)?;

        let mut hashes = revwalk
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CanopyError::Git)?
            .into_iter()
            .map(|oid| oid.to_string())
            .collect::<Vec<_>>();
        hashes.reverse();
        Ok(hashes)
    }

    fn first_parent(&self, commit: &str) -> Result<Option<String>> {
        let oid = Oid::from_str(&self.resolve_commit(commit)?).map_err(CanopyError::Git)?;
        let commit = self.repo.find_commit(oid).map_err(CanopyError::Git)?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        Ok(Some(commit.parent_id(0).map_err(CanopyError::Git)?.to_string()))
    }

    fn branches_containing(&self, commit: &str) -> Result<Vec<String>> {
        let oid = Oid::from_str(&self.resolve_commit(commit)?).map_err(CanopyError::Git)?;

        let mut names = Vec::new();
        let branches = self
            .repo
            .branches(Some(git2::BranchType::Local))
            .map_err(CanopyError::Git)?;
        for branch in branches {
            let (branch, _) = branch.map_err(CanopyError::Git)?;
            let tip = match branch.get().target() {
                Some(tip) => tip,
                None => continue,
            };
            let contains =
                tip == oid || self.repo.graph_descendant_of(tip, oid).unwrap_or(false);
            if contains {
                if let Ok(Some(name)) = branch.name() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn is_patch_merged(&self, branch: &str, upstream: &str) -> Result<bool> {
        let out = self.run_git_ok(&self.root, &["cherry", upstream, branch])?;
        // `git cherry` prefixes commits not patch-present upstream with '+'.
        Ok(!out.lines().any(|line| line.starts_with('+')))
    }

    fn upstream_gone(&self, branch: &str) -> Result<bool> {
        let refname = format!("refs/heads/{branch}");
        let out = self.run_git_ok(
            &self.root,
            &["for-each-ref", "--format=%(upstream:track)", &refname],
        )?;
        Ok(out.trim() == "[gone]")
    }

    fn current_branch(&self, worktree: &Path) -> Result<Option<String>> {
        let out = self.run_git(worktree, &["symbolic-ref", "--short", "-q", "HEAD"])?;
        if out.status.success() {
            Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    fn head_commit(&self, worktree: &Path) -> Result<String> {
        Ok(self
            .run_git_ok(worktree, &["rev-parse", "HEAD"])?
            .trim()
            .to_string())
    }

    fn is_dirty(&self, worktree: &Path) -> Result<bool> {
        let out = self.run_git_ok(worktree, &["status", "--porcelain"])?;
        Ok(!out.trim().is_empty())
    }

    fn soft_reset(&self, worktree: &Path, target: &str) -> Result<()> {
        self.run_git_ok(worktree, &["reset", "--soft", target])?;
        Ok(())
    }

    fn fast_forward(&self, worktree: &Path, target: &str) -> Result<()> {
        self.run_git_ok(worktree, &["merge", "--ff-only", target])?;
        Ok(())
    }

    fn commit(&self, worktree: &Path, message: Option<&str>) -> Result<()> {
        match message {
            Some(msg) => {
                self.run_git_ok(worktree, &["commit", "-m", msg])?;
                Ok(())
            }
            None => {
                // Interactive: hand the terminal to the user's editor.
                let status = Command::new("git")
                    .arg("-C")
                    .arg(worktree)
                    .arg("commit")
                    .status()
                    .map_err(|e| CanopyError::engine(format!("failed to run git: {e}")))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(CanopyError::engine("commit aborted or failed"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let out = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().join("repo");
        std::fs::create_dir(&repo_path).unwrap();

        git(&repo_path, &["init", "-b", "main"]);
        git(&repo_path, &["config", "user.name", "Test"]);
        git(&repo_path, &["config", "user.email", "test@test.com"]);

        std::fs::write(repo_path.join("README.md"), "# Test").unwrap();
        git(&repo_path, &["add", "."]);
        git(&repo_path, &["commit", "-m", "Initial commit"]);

        (temp_dir, repo_path)
    }

    fn create_commit(repo_path: &Path, message: &str, filename: &str, content: &str) {
        std::fs::write(repo_path.join(filename), content).unwrap();
        git(repo_path, &["add", filename]);
        git(repo_path, &["commit", "-m", message]);
    }

    #[test]
    fn test_list_worktrees_marks_main() {
        let (tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        let wt_path = tmp.path().join("wt-feature");
        engine
            .add_worktree(&wt_path, "feature", Some("main"), true)
            .unwrap();

        let worktrees = engine.list_worktrees().unwrap();
        assert_eq!(worktrees.len(), 2);
        assert!(worktrees[0].is_main);
        assert_eq!(worktrees[0].branch.as_deref(), Some("main"));
        assert!(!worktrees[1].is_main);
        assert_eq!(worktrees[1].branch.as_deref(), Some("feature"));
    }

    #[test]
    fn test_add_worktree_checks_out_an_existing_branch() {
        let (tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();
        git(&repo_path, &["branch", "feature"]);

        let wt_path = tmp.path().join("wt-feature");
        engine.add_worktree(&wt_path, "feature", None, false).unwrap();

        let worktrees = engine.list_worktrees().unwrap();
        assert!(worktrees
            .iter()
            .any(|wt| wt.branch.as_deref() == Some("feature")));
        assert!(wt_path.join("README.md").exists());
        assert_eq!(
            engine.resolve_commit("feature").unwrap(),
            engine.resolve_commit("main").unwrap()
        );
    }

    #[test]
    fn test_anchor_lifecycle() {
        let (_tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        assert_eq!(engine.read_anchor("feature").unwrap(), None);

        let tip = engine.resolve_commit("main").unwrap();
        engine.write_anchor("feature", "main").unwrap();
        assert_eq!(engine.read_anchor("feature").unwrap(), Some(tip));

        engine.delete_anchor("feature").unwrap();
        assert_eq!(engine.read_anchor("feature").unwrap(), None);

        // Deleting an absent anchor is not an error
        engine.delete_anchor("feature").unwrap();
    }

    #[test]
    fn test_commits_between_oldest_first() {
        let (_tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        let base = engine.resolve_commit("main").unwrap();
        create_commit(&repo_path, "first", "a.txt", "a");
        create_commit(&repo_path, "second", "b.txt", "b");

        let commits = engine.commits_between(&base, "main").unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].subject, "first");
        assert_eq!(commits[1].subject, "second");
        assert_eq!(commits[0].short_hash.len(), 8);
    }

    #[test]
    fn test_merge_base_and_unique_commits() {
        let (tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();
        let base = engine.resolve_commit("main").unwrap();

        let wt = tmp.path().join("wt-topic");
        engine.add_worktree(&wt, "topic", Some("main"), true).unwrap();
        create_commit(&wt, "topic work", "topic.txt", "x");

        assert_eq!(engine.merge_base("main", "topic").unwrap(), base);

        let unique = engine.commits_unique_to("topic", "main").unwrap();
        assert_eq!(unique.len(), 1);
        assert_eq!(
            engine.first_parent(&unique[0]).unwrap(),
            Some(base.clone())
        );

        assert!(engine.commits_unique_to("main", "topic").unwrap().is_empty());
    }

    #[test]
    fn test_current_branch_and_detached() {
        let (_tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        assert_eq!(
            engine.current_branch(&repo_path).unwrap().as_deref(),
            Some("main")
        );

        let head = engine.head_commit(&repo_path).unwrap();
        git(&repo_path, &["checkout", "--detach", &head]);
        assert_eq!(engine.current_branch(&repo_path).unwrap(), None);
    }

    #[test]
    fn test_dirty_detection() {
        let (_tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        assert!(!engine.is_dirty(&repo_path).unwrap());
        std::fs::write(repo_path.join("scratch.txt"), "wip").unwrap();
        assert!(engine.is_dirty(&repo_path).unwrap());
    }

    #[test]
    fn test_rebase_conflict_classification() {
        let (tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        create_commit(&repo_path, "seed", "shared.txt", "base\n");

        let wt = tmp.path().join("wt-clash");
        engine.add_worktree(&wt, "clash", Some("main"), true).unwrap();
        create_commit(&wt, "branch side", "shared.txt", "branch\n");
        create_commit(&repo_path, "main side", "shared.txt", "main\n");

        let outcome = engine.rebase(&wt, "main").unwrap();
        assert_eq!(outcome, RebaseOutcome::Conflict);
        assert!(engine.rebase_in_progress(&wt).unwrap());
        assert_eq!(
            engine.rebase_branch_name(&wt).unwrap().as_deref(),
            Some("clash")
        );

        git(&wt, &["rebase", "--abort"]);
        assert!(!engine.rebase_in_progress(&wt).unwrap());
    }

    #[test]
    fn test_patch_equivalence_detects_squash_merge() {
        let (tmp, repo_path) = create_test_repo();
        let engine = GitEngine::open(&repo_path).unwrap();

        let wt = tmp.path().join("wt-feat");
        engine.add_worktree(&wt, "feat", Some("main"), true).unwrap();
        create_commit(&wt, "feature work", "feat.txt", "payload\n");
        assert!(!engine.is_patch_merged("feat", "main").unwrap());

        // Apply the same patch to main under a different hash
        git(&repo_path, &["cherry-pick", "-n", "feat"]);
        git(&repo_path, &["commit", "-m", "squash-merge feature"]);

        assert!(engine.is_patch_merged("feat", "main").unwrap());
    }
}
