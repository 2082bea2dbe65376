//! In-memory coordination store for tests and single-process embedding.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::intent::{OpKind, WriteOp};
use crate::store::{ChildListing, CoordStore, NodeStat, StoreError};

#[derive(Debug, Default)]
struct Node {
    children: BTreeSet<String>,
    child_version: i64,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    submissions: u64,
    listings: u64,
    inject_conflicts: u32,
}

/// In-memory [`CoordStore`] with the same atomicity and conflict semantics
/// as a real coordination service: batches validate against current children
/// (with in-batch effects visible), apply all-or-nothing, and bump the
/// child-version counter once per applied op. The base node is created on
/// first write; [`ensure_node`](Self::ensure_node) pre-creates it so an
/// empty listing can be read.
#[derive(Debug, Default)]
pub struct MemCoordStore {
    inner: Mutex<Inner>,
}

impl MemCoordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty coordination node so children can be listed under it.
    pub fn ensure_node(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.entry(path.to_string()).or_default();
    }

    /// Batches submitted so far, accepted or rejected.
    pub fn submissions(&self) -> u64 {
        self.inner.lock().unwrap().submissions
    }

    /// Child listings served so far.
    pub fn listings(&self) -> u64 {
        self.inner.lock().unwrap().listings
    }

    /// Reject the next `n` submissions with a synthetic conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.inner.lock().unwrap().inject_conflicts = n;
    }

    /// Current children of `path`, for assertions.
    pub fn children_of(&self, path: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl CoordStore for MemCoordStore {
    fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nodes.get(path).map(|node| NodeStat {
            child_version: node.child_version,
        }))
    }

    fn children(&self, path: &str) -> Result<ChildListing, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.listings += 1;
        let Some(node) = inner.nodes.get(path) else {
            return Err(StoreError::NoNode {
                path: path.to_string(),
            });
        };
        Ok(ChildListing {
            names: node.children.iter().cloned().collect(),
            child_version: node.child_version,
        })
    }

    fn submit(&self, path: &str, ops: &[WriteOp]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.submissions += 1;
        if inner.inject_conflicts > 0 {
            inner.inject_conflicts -= 1;
            let child = ops.first().map(|op| op.entry.encoded()).unwrap_or("");
            return Err(StoreError::NodeExists {
                path: format!("{path}/{child}"),
            });
        }

        let node = inner.nodes.entry(path.to_string()).or_default();
        let mut staged = node.children.clone();
        for op in ops {
            let name = op.entry.encoded();
            match op.kind {
                OpKind::Create => {
                    if !staged.insert(name.to_string()) {
                        return Err(StoreError::NodeExists {
                            path: format!("{path}/{name}"),
                        });
                    }
                }
                OpKind::Delete => {
                    if !staged.remove(name) {
                        return Err(StoreError::NoNode {
                            path: format!("{path}/{name}"),
                        });
                    }
                }
            }
        }
        node.children = staged;
        node.child_version += ops.len() as i64;
        Ok(())
    }
}
