use crate::cli::output::Output;
use crate::config::{ConfigStore, StackEntry};
use crate::errors::{CanopyError, Result};
use crate::git::GitEngine;
use crate::stack::{CleanupEngine, RemovalReason};
use crate::utils::Spinner;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use tokio::task::JoinSet;

pub async fn run(yes: bool, dry_run: bool) -> Result<()> {
    let mut config = ConfigStore::load()?;
    if config.repos.is_empty() {
        Output::info("No repositories tracked yet");
        return Ok(());
    }

    // Phase one: refresh every remote concurrently. A repository that fails
    // here sits out the rest of the run; stale remote state would make the
    // merged/gone classification lie.
    let spinner = Spinner::new("Fetching remotes...".to_string());
    let mut set = JoinSet::new();
    for repo in config.repos.clone() {
        set.spawn_blocking(move || {
            let engine = GitEngine::open(&repo.root)?;
            CleanupEngine::new(&engine).prepare()?;
            Ok::<String, CanopyError>(repo.name)
        });
    }
    let mut ready = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(name)) => {
                spinner.update_message(format!("Fetched {name}"));
                ready.push(name);
            }
            Ok(Err(err)) => spinner.println(format!("  fetch failed, repository skipped: {err}")),
            Err(err) => spinner.println(format!("  fetch task panicked: {err}")),
        }
    }
    spinner.stop();

    // Phase two: classify and remove, one repository at a time. A repository
    // that cannot be opened or classified is skipped with a warning; one bad
    // repository must not abort the others.
    let mut anything_found = false;
    let mut merged_total = 0usize;
    let mut gone_total = 0usize;
    let mut skipped_total = 0usize;
    for name in ready {
        let Some(repo) = config.repo(&name) else { continue };
        let root = repo.root.clone();
        let stacks = repo.stacks.clone();
        let default = repo.default_branch.clone();

        let engine = match GitEngine::open(&root) {
            Ok(engine) => engine,
            Err(err) => {
                Output::warning(format!("Skipping '{}': {}", name, err));
                continue;
            }
        };
        let cleaner = CleanupEngine::new(&engine);
        let plan = match cleaner.plan(default.as_deref()) {
            Ok(plan) => plan,
            Err(err) => {
                Output::warning(format!("Skipping '{}': {}", name, err));
                continue;
            }
        };

        for branch in &plan.skipped_dirty {
            Output::warning(format!(
                "'{}' in {} looks merged but has uncommitted changes; skipping",
                branch, name
            ));
        }
        skipped_total += plan.skipped_dirty.len();
        anything_found = anything_found || !plan.skipped_dirty.is_empty();
        if plan.is_empty() {
            continue;
        }
        anything_found = true;

        Output::section(name.clone());
        for removal in &plan.removals {
            Output::bullet(format!(
                "{} ({}) {}",
                style(&removal.branch).cyan(),
                removal.reason,
                style(removal.worktree.display()).dim()
            ));
        }
        if dry_run {
            for removal in &plan.removals {
                match removal.reason {
                    RemovalReason::Merged => merged_total += 1,
                    RemovalReason::UpstreamGone => gone_total += 1,
                }
            }
            continue;
        }
        if !yes {
            let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!(
                    "Remove {} worktrees from '{}'?",
                    plan.removals.len(),
                    name
                ))
                .default(false)
                .interact()
                .map_err(|e| CanopyError::config(format!("Input error: {e}")))?;
            if !confirmed {
                continue;
            }
        }

        let remaining = match cleaner.execute(&stacks, &plan) {
            Ok(remaining) => remaining,
            Err(err) => {
                Output::warning(format!(
                    "Cleanup of '{}' did not finish: {}; re-run to retry",
                    name, err
                ));
                continue;
            }
        };
        persist_stacks(&mut config, &name, remaining)?;
        for removal in &plan.removals {
            match removal.reason {
                RemovalReason::Merged => merged_total += 1,
                RemovalReason::UpstreamGone => gone_total += 1,
            }
            Output::success(format!("Removed '{}'", removal.branch));
        }
    }

    if !anything_found {
        Output::success("Everything is already clean");
        return Ok(());
    }
    if dry_run {
        Output::info("Dry run; nothing was removed");
    }
    Output::info(format!(
        "{} merged, {} upstream gone, {} skipped (uncommitted changes)",
        merged_total, gone_total, skipped_total
    ));
    Ok(())
}

/// Write a repository's surviving edges to disk right away. The worktrees
/// are already gone; holding the edges in memory until the end of the run
/// would lose them if a later repository fails.
fn persist_stacks(config: &mut ConfigStore, name: &str, remaining: Vec<StackEntry>) -> Result<()> {
    if let Some(entry) = config.repo_mut(name) {
        entry.stacks = remaining;
    }
    config.save()
}
