/// Canopy Error Types
#[derive(Debug, thiserror::Error)]
pub enum CanopyError {
    /// Git-related errors (libgit2 layer)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Branch management errors
    #[error("Branch error: {0}")]
    Branch(String),

    /// Precondition violations: the operation aborted before any mutation
    #[error("{0}")]
    Precondition(String),

    /// Failures surfaced verbatim from the external git engine
    #[error("git failed: {0}")]
    Engine(String),

    /// Partial-success states that need a manual follow-up, never rolled back
    #[error("{0}")]
    Recoverable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanopyError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CanopyError::Config(msg.into())
    }

    pub fn branch<S: Into<String>>(msg: S) -> Self {
        CanopyError::Branch(msg.into())
    }

    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        CanopyError::Precondition(msg.into())
    }

    pub fn engine<S: Into<String>>(msg: S) -> Self {
        CanopyError::Engine(msg.into())
    }

    pub fn recoverable<S: Into<String>>(msg: S) -> Self {
        CanopyError::Recoverable(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CanopyError>;
