//! Persisted configuration: the list of tracked repositories and, per
//! repository, the stack edges between branches.

pub mod store;

pub use store::{ConfigStore, RepoEntry, StackEntry};
