use super::CommandContext;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::CollapseEngine;

pub async fn run() -> Result<()> {
    let mut ctx = CommandContext::load()?;
    let branch = ctx.current_branch()?;

    let repo = ctx.repo()?;
    let default = repo.default_branch.clone();
    let (updated, report) =
        CollapseEngine::new(&ctx.engine).run(&repo.stacks, &branch, default.as_deref())?;

    if let Some(paused) = &report.paused {
        Output::warning(format!(
            "Rebase of '{}' hit conflicts in {}",
            paused.branch,
            paused.worktree.display()
        ));
        Output::tip("Resolve the conflicts, stage them, then run 'canopy continue'");
        return Ok(());
    }

    ctx.repo_mut()?.stacks = updated;
    ctx.config.save()?;

    Output::success(format!(
        "Folded '{}' into '{}'",
        report.absorbed, branch
    ));
    match &report.new_parent {
        Some(parent) => Output::sub_item(format!("'{}' is now stacked on '{}'", branch, parent)),
        None => Output::sub_item(format!("'{}' is now a stack root", branch)),
    }
    if let Some(path) = &report.removed_worktree {
        Output::sub_item(format!("Removed worktree {}", path.display()));
    }
    Ok(())
}
