use crate::cli::output::Output;
use crate::config::{ConfigStore, RepoEntry};
use crate::errors::{CanopyError, Result};
use crate::git::{GitEngine, VcsPort};
use crate::utils::Spinner;
use tokio::task::JoinSet;

struct Refresh {
    name: String,
    default: String,
    fast_forwarded: bool,
}

pub async fn run() -> Result<()> {
    let mut config = ConfigStore::load()?;
    if config.repos.is_empty() {
        Output::info("No repositories tracked yet");
        return Ok(());
    }

    let spinner = Spinner::new("Fetching remotes...".to_string());
    let mut set = JoinSet::new();
    for repo in config.repos.clone() {
        set.spawn_blocking(move || refresh_repo(repo));
    }

    // Config mutations wait until every task has finished; the tasks only
    // touch their own repositories.
    let mut refreshed = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(refresh)) => {
                spinner.println(format!("  fetched {}", refresh.name));
                refreshed.push(refresh);
            }
            Ok(Err(err)) => spinner.println(format!("  fetch failed: {err}")),
            Err(err) => spinner.println(format!("  fetch task panicked: {err}")),
        }
    }
    spinner.stop();

    for refresh in &refreshed {
        if refresh.fast_forwarded {
            Output::success(format!(
                "{}: trunk '{}' fast-forwarded",
                refresh.name, refresh.default
            ));
        } else {
            Output::success(format!("{}: fetched", refresh.name));
        }
        if let Some(entry) = config.repo_mut(&refresh.name) {
            if entry.default_branch.as_deref() != Some(refresh.default.as_str()) {
                Output::sub_item(format!("default branch is now '{}'", refresh.default));
                entry.default_branch = Some(refresh.default.clone());
            }
        }
    }
    config.save()?;
    Ok(())
}

fn refresh_repo(repo: RepoEntry) -> std::result::Result<Refresh, CanopyError> {
    let engine = GitEngine::open(&repo.root)?;
    engine.ensure_fetch_refspec()?;
    engine.fetch(true)?;
    let default = engine.default_branch()?;

    // Fast-forward the trunk only where it is safe: a clean checkout with a
    // remote counterpart to advance to.
    let mut fast_forwarded = false;
    if engine.has_ref(&format!("refs/remotes/origin/{default}")) {
        let trunk_worktree = engine
            .list_worktrees()?
            .into_iter()
            .find(|wt| wt.branch.as_deref() == Some(default.as_str()));
        if let Some(wt) = trunk_worktree {
            if !engine.is_dirty(&wt.path)? {
                match engine.fast_forward(&wt.path, &format!("origin/{default}")) {
                    Ok(()) => fast_forwarded = true,
                    Err(err) => tracing::warn!(
                        "could not fast-forward '{}' in {}: {}",
                        default,
                        repo.name,
                        err
                    ),
                }
            }
        }
    }
    Ok(Refresh {
        name: repo.name,
        default,
        fast_forwarded,
    })
}
