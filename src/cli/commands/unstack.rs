use super::CommandContext;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::UnstackEngine;

pub async fn run(branch: Option<String>) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    let branch = match branch {
        Some(b) => b,
        None => ctx.current_branch()?,
    };

    let repo = ctx.repo()?;
    let (updated, report) =
        UnstackEngine::new(&ctx.engine).run(&repo.stacks, &branch, repo.default_branch.as_deref())?;

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

    Output::success(format!("Unstacked '{}' onto {}", branch, report.target));
    if !report.children_to_restack.is_empty() {
        Output::warning(format!(
            "Still stacked on '{}': {}",
            branch,
            report.children_to_restack.join(", ")
        ));
        Output::tip("Run 'canopy restack' to move them onto the rewritten commits");
    }
    Ok(())
}
