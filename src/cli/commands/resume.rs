use super::restack::apply_report;
use super::CommandContext;
use crate::errors::Result;
use crate::stack::ConflictRecovery;

pub async fn run() -> Result<()> {
    let mut ctx = CommandContext::load()?;
    let repo = ctx.repo()?;
    let report = ConflictRecovery::new(&ctx.engine)
        .resume(&repo.stacks, repo.default_branch.as_deref())?;
    apply_report(&mut ctx, &report)?;
    Ok(())
}
