//! The coordination-store seam.
//!
//! Everything this crate persists lives as children of one hierarchical,
//! versioned node in an external coordination service. The service is
//! reached through [`CoordStore`], a synchronous trait; callers bring their
//! own threading.

use thiserror::Error;

use crate::intent::WriteOp;

/// Metadata for a coordination node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Counter bumped by the store on every child add/remove.
    pub child_version: i64,
}

/// One atomic read of a node's child names plus its child-version counter.
#[derive(Debug, Clone)]
pub struct ChildListing {
    pub names: Vec<String>,
    pub child_version: i64,
}

/// Errors surfaced by a coordination store.
///
/// `NodeExists` and `NoNode` are raised by [`CoordStore::submit`] only when
/// a create collides with a live child or a delete targets a missing one.
/// Both mean the snapshot the batch was computed from is stale, and the
/// persistence engine may retry. A store whose API can raise these for
/// structural reasons (permissions, quotas) must map those cases to
/// `Unavailable`, which is never retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("child already exists: {path}")]
    NodeExists { path: String },
    #[error("no such child: {path}")]
    NoNode { path: String },
    #[error("coordination store unavailable: {source}")]
    Unavailable {
        #[from]
        source: anyhow::Error,
    },
    #[error("interrupted while waiting on the coordination store")]
    Interrupted,
}

impl StoreError {
    /// True for the two staleness signals the retry loop may absorb.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::NodeExists { .. } | StoreError::NoNode { .. }
        )
    }
}

/// Hierarchical coordination service holding the per-replica entries.
///
/// Children of a state node are named exactly [`ReplicaEntry::encoded`] and
/// carry no payload; presence/absence plus the name encode everything.
///
/// [`ReplicaEntry::encoded`]: crate::entry::ReplicaEntry::encoded
pub trait CoordStore: Send + Sync {
    /// Node metadata, or `None` when the node does not exist.
    fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError>;

    /// Child names and the child-version counter, read atomically.
    fn children(&self, path: &str) -> Result<ChildListing, StoreError>;

    /// Apply a batch of child creates/deletes under `path`, all-or-nothing.
    /// The whole batch fails if any single create collides with an existing
    /// child or any single delete targets a missing one.
    fn submit(&self, path: &str, ops: &[WriteOp]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_classification() {
        assert!(StoreError::NodeExists {
            path: "/c1/r1:0:A".to_string()
        }
        .is_conflict());
        assert!(StoreError::NoNode {
            path: "/c1/r1:0:A".to_string()
        }
        .is_conflict());
        assert!(!StoreError::Unavailable {
            source: anyhow::anyhow!("connection reset")
        }
        .is_conflict());
        assert!(!StoreError::Interrupted.is_conflict());
    }
}
