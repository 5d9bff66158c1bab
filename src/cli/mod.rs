pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Stacked branches on dedicated git worktrees")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tracked repository management
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Create a worktree for a fresh branch rooted at the trunk
    New {
        /// Branch to create
        branch: String,

        /// Base the branch on this ref instead of the trunk
        #[arg(long)]
        base: Option<String>,
    },

    /// Create a worktree for a fresh branch stacked on the current one
    Stack {
        /// Branch to create on top of the current branch
        branch: String,
    },

    /// List the current repository's worktrees and their stack parents
    Ls,

    /// Rebase a branch and everything stacked on it onto fresh parents
    Restack {
        /// Branch to restack (defaults to the current branch)
        branch: Option<String>,
    },

    /// Resume a restack that paused on conflicts
    Continue,

    /// Fold the current branch's parent out of the stack
    Collapse,

    /// Detach a branch from its stack, replaying it onto the trunk
    Unstack {
        /// Branch to unstack (defaults to the current branch)
        branch: Option<String>,
    },

    /// Squash the current branch's own commits into one
    Squash {
        /// Message for the squashed commit
        #[arg(long, short)]
        message: Option<String>,

        /// Reuse the first commit's message instead of opening an editor
        #[arg(long)]
        first: bool,

        /// Show what would be squashed without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove worktrees whose branches were merged or deleted upstream
    Cleanup {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Show what would be removed without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch every tracked repository and fast-forward its trunk
    Latest,
}

#[derive(Debug, Subcommand)]
pub enum RepoAction {
    /// Start tracking a repository
    Add {
        /// Path inside the repository (defaults to the current directory)
        path: Option<PathBuf>,
    },

    /// List tracked repositories
    List,

    /// Stop tracking a repository (leaves the repository itself alone)
    Remove {
        /// Repository name as shown by `repo list`
        name: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Repo { action } => match action {
                RepoAction::Add { path } => commands::repo::add(path).await,
                RepoAction::List => commands::repo::list().await,
                RepoAction::Remove { name } => commands::repo::remove(&name).await,
            },
            Commands::New { branch, base } => commands::worktree::new(&branch, base).await,
            Commands::Stack { branch } => commands::worktree::stack(&branch).await,
            Commands::Ls => commands::worktree::ls().await,
            Commands::Restack { branch } => commands::restack::run(branch).await,
            Commands::Continue => commands::resume::run().await,
            Commands::Collapse => commands::collapse::run().await,
            Commands::Unstack { branch } => commands::unstack::run(branch).await,
            Commands::Squash {
                message,
                first,
                dry_run,
            } => commands::squash::run(message, first, dry_run).await,
            Commands::Cleanup { yes, dry_run } => commands::cleanup::run(yes, dry_run).await,
            Commands::Latest => commands::latest::run().await,
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
