use super::CommandContext;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::{SquashEngine, SquashOptions, SquashOutcome};
use console::style;

pub async fn run(message: Option<String>, first: bool, dry_run: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    let branch = ctx.current_branch()?;
    let worktree = ctx.worktree_of(&branch)?;

    let repo = ctx.repo()?;
    let opts = SquashOptions {
        message,
        use_first_commit_message: first,
        dry_run,
    };
    let outcome = SquashEngine::new(&ctx.engine).run(
        &repo.stacks,
        &branch,
        &worktree,
        &opts,
        repo.default_branch.as_deref(),
    )?;

    match outcome {
        SquashOutcome::NoOp => {
            Output::info(format!("'{}' has a single commit; nothing to squash", branch));
        }
        SquashOutcome::Squashed { count } => {
            Output::success(format!("Squashed {} commits on '{}'", count, branch));
        }
        SquashOutcome::DryRun(plan) => {
            Output::section(format!("Would squash on '{}'", branch));
            for commit in &plan.commits {
                Output::bullet(format!(
                    "{} {}",
                    style(&commit.short_hash).yellow(),
                    commit.subject
                ));
            }
            Output::sub_item(format!(
                "Base: {}",
                &plan.base[..8.min(plan.base.len())]
            ));
            if !plan.containing_branches.is_empty() {
                Output::sub_item(format!(
                    "Base reachable from: {}",
                    plan.containing_branches.join(", ")
                ));
            }
        }
    }
    Ok(())
}
