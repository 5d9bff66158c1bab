use crate::cli::output::Output;
use crate::config::{ConfigStore, RepoEntry};
use crate::errors::{CanopyError, Result};
use crate::git::{GitEngine, VcsPort};
use chrono::Utc;
use console::style;
use std::env;
use std::path::PathBuf;

pub async fn add(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => env::current_dir()?,
    };
    let repo = git2::Repository::discover(&path)?;
    let bare = repo.is_bare();
    let root = if bare {
        repo.path().to_path_buf()
    } else {
        repo.workdir()
            .ok_or_else(|| CanopyError::config("repository has no working directory"))?
            .to_path_buf()
    };
    let root = root.canonicalize()?;
    let name = root
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| CanopyError::config("cannot derive a name from the repository path"))?;
    let remote = repo
        .find_remote("origin")
        .ok()
        .and_then(|r| r.url().map(str::to_string))
        .unwrap_or_default();

    let engine = GitEngine::open(&root)?;
    let default_branch = engine.default_branch().ok();

    let mut config = ConfigStore::load()?;
    config.add_repo(RepoEntry {
        name: name.clone(),
        remote,
        root: root.clone(),
        bare,
        default_branch,
        stacks: Vec::new(),
        added_at: Utc::now(),
    })?;
    config.save()?;

    Output::success(format!("Tracking '{}'", name));
    Output::sub_item(format!("Root: {}", root.display()));
    Ok(())
}

pub async fn list() -> Result<()> {
    let config = ConfigStore::load()?;
    if config.repos.is_empty() {
        Output::info("No repositories tracked yet");
        Output::tip("Run 'canopy repo add' from inside a repository");
        return Ok(());
    }

    Output::section("Tracked repositories");
    for repo in &config.repos {
        let kind = if repo.bare { " (bare)" } else { "" };
        Output::bullet(format!(
            "{}{} {}",
            style(&repo.name).cyan(),
            kind,
            style(repo.root.display()).dim()
        ));
        if !repo.stacks.is_empty() {
            Output::sub_item(format!("{} stacked branches", repo.stacks.len()));
        }
    }
    Ok(())
}

pub async fn remove(name: &str) -> Result<()> {
    let mut config = ConfigStore::load()?;
    let removed = config.remove_repo(name)?;
    config.save()?;
    Output::success(format!("No longer tracking '{}'", removed.name));
    Output::sub_item("The repository and its worktrees were left untouched");
    Ok(())
}
