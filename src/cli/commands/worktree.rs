use super::CommandContext;
use crate::cli::output::Output;
use crate::errors::{CanopyError, Result};
use crate::git::{trunk_target, VcsPort};
use crate::stack::StackGraph;
use console::style;

pub async fn new(branch: &str, base: Option<String>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let repo = ctx.repo()?;
    let path = repo.worktree_path(branch);

    // An existing branch gets checked out as-is; a fresh one is cut from
    // the requested base or the trunk.
    if ctx.engine.branch_exists(branch) {
        if base.is_some() {
            return Err(CanopyError::precondition(format!(
                "branch '{branch}' already exists; it cannot be re-created from a base"
            )));
        }
        ctx.engine.add_worktree(&path, branch, None, false)?;
        Output::success(format!("Checked out existing branch '{}'", branch));
    } else {
        let base = match base {
            Some(b) => b,
            None => trunk_target(&ctx.engine, repo.default_branch.as_deref())?,
        };
        ctx.engine.add_worktree(&path, branch, Some(&base), true)?;
        Output::success(format!("Created '{}' on {}", branch, base));
    }
    Output::sub_item(format!("Worktree: {}", path.display()));
    Ok(())
}

pub async fn stack(branch: &str) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    if ctx.engine.branch_exists(branch) {
        return Err(CanopyError::precondition(format!(
            "branch '{branch}' already exists"
        )));
    }
    let parent = ctx.current_branch()?;

    let repo = ctx.repo()?;
    let updated = StackGraph::new(&repo.stacks).add(&parent, branch)?;
    let path = repo.worktree_path(branch);
    ctx.engine.add_worktree(&path, branch, Some(&parent), true)?;

    // The child starts at the parent's tip, which is exactly its fork point.
    let anchor = ctx.engine.resolve_commit(&parent)?;
    ctx.engine.write_anchor(branch, &anchor)?;

    ctx.repo_mut()?.stacks = updated;
    ctx.config.save()?;

    Output::success(format!("Created '{}' stacked on '{}'", branch, parent));
    Output::sub_item(format!("Worktree: {}", path.display()));
    Output::sub_item(format!("Fork point: {}", &anchor[..8.min(anchor.len())]));
    Ok(())
}

pub async fn ls() -> Result<()> {
    let ctx = CommandContext::load()?;
    let repo = ctx.repo()?;
    let graph = StackGraph::new(&repo.stacks);
    let worktrees = ctx.engine.list_worktrees()?;

    Output::section(format!("Worktrees of {}", repo.name));
    for wt in &worktrees {
        let Some(branch) = &wt.branch else {
            Output::bullet(format!("(detached) {}", style(wt.path.display()).dim()));
            continue;
        };
        let mut line = format!("{} {}", style(branch).cyan(), style(wt.path.display()).dim());
        if let Some(parent) = graph.parent_of(branch) {
            line.push_str(&format!(" {}", style(format!("← stacked on {parent}")).dim()));
        }
        if wt.is_main {
            line.push_str(&format!(" {}", style("[main]").green()));
        }
        Output::bullet(line);
    }

    // Edges whose branches lost their worktrees still show up, so stale
    // tracking is visible.
    for entry in &repo.stacks {
        let known = worktrees
            .iter()
            .any(|wt| wt.branch.as_deref() == Some(entry.child.as_str()));
        if !known {
            Output::warning(format!(
                "'{}' is tracked under '{}' but has no worktree",
                entry.child, entry.parent
            ));
        }
    }
    Ok(())
}
