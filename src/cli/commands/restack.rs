use super::CommandContext;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::{RestackEngine, RestackReport, StackGraph};

pub async fn run(branch: Option<String>) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    let branch = match branch {
        Some(b) => b,
        None => ctx.current_branch()?,
    };

    let repo = ctx.repo()?;
    let report = RestackEngine::new(&ctx.engine).run(
        &repo.stacks,
        &branch,
        repo.default_branch.as_deref(),
    )?;
    apply_report(&mut ctx, &report)?;
    Ok(())
}

/// Persist edge removals and tell the user what happened. Shared with
/// `canopy continue`.
pub(crate) fn apply_report(ctx: &mut CommandContext, report: &RestackReport) -> Result<()> {
    if !report.detached.is_empty() || !report.untracked.is_empty() {
        let repo = ctx.repo_mut()?;
        for child in report.detached.iter().chain(&report.untracked) {
            repo.stacks = StackGraph::new(&repo.stacks).remove_by_child(child);
        }
        ctx.config.save()?;
    }

    for branch in &report.restacked {
        Output::success(format!("Restacked '{}'", branch));
    }
    for branch in &report.skipped {
        Output::warning(format!("Skipped '{}' (no worktree)", branch));
    }
    for branch in &report.detached {
        Output::warning(format!(
            "'{}' lost its parent and was rebased onto the trunk",
            branch
        ));
    }
    for branch in &report.untracked {
        Output::warning(format!(
            "Parent of '{}' is gone; it is no longer tracked as stacked",
            branch
        ));
    }
    if let Some(paused) = &report.paused {
        Output::warning(format!(
            "Rebase of '{}' hit conflicts in {}",
            paused.branch,
            paused.worktree.display()
        ));
        Output::tip("Resolve the conflicts, stage them, then run 'canopy continue'");
        if !report.pending.is_empty() {
            Output::warning(format!(
                "Not restacked yet: {}",
                report.pending.join(", ")
            ));
            Output::tip("Run 'canopy restack' again for them once the conflict is resolved");
        }
    } else if report.restacked.is_empty() && report.skipped.is_empty() {
        Output::info("Nothing to restack");
    }
    Ok(())
}
