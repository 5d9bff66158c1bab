use crate::config::StackEntry;
use crate::errors::{CanopyError, Result};

/// Pure in-memory view over a repository's stack edges.
///
/// Every operation that edits the edge set returns a new vector; nothing is
/// mutated in place, so callers can compare before/after to decide whether a
/// config save is needed.
pub struct StackGraph<'a> {
    edges: &'a [StackEntry],
}

impl<'a> StackGraph<'a> {
    pub fn new(edges: &'a [StackEntry]) -> Self {
        Self { edges }
    }

    /// Each branch has at most one parent (the edges form a forest).
    pub fn parent_of(&self, branch: &str) -> Option<&'a str> {
        self.edges
            .iter()
            .find(|e| e.child == branch)
            .map(|e| e.parent.as_str())
    }

    /// One parent can have several stacked children.
    pub fn children_of(&self, branch: &str) -> Vec<&'a str> {
        self.edges
            .iter()
            .filter(|e| e.parent == branch)
            .map(|e| e.child.as_str())
            .collect()
    }

    pub fn add(&self, parent: &str, child: &str) -> Result<Vec<StackEntry>> {
        if let Some(existing) = self.parent_of(child) {
            return Err(CanopyError::precondition(format!(
                "'{child}' is already stacked on '{existing}'"
            )));
        }
        let mut edges = self.edges.to_vec();
        edges.push(StackEntry {
            parent: parent.to_string(),
            child: child.to_string(),
        });
        Ok(edges)
    }

    pub fn remove_by_child(&self, child: &str) -> Vec<StackEntry> {
        self.edges
            .iter()
            .filter(|e| e.child != child)
            .cloned()
            .collect()
    }

    /// Used when a node is force-removed: every edge where it is the parent
    /// is deleted, making those children independent. They keep their
    /// commits but lose ancestry tracking.
    pub fn remove_all_by_parent(&self, parent: &str) -> Vec<StackEntry> {
        self.edges
            .iter()
            .filter(|e| e.parent != parent)
            .cloned()
            .collect()
    }
}
