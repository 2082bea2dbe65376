//! The slice of the collection topology this subsystem needs.
//!
//! Only replica identity, lifecycle state, and the leader flag participate
//! in per-replica entries; the rest of the cluster document model stays
//! outside.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entry::ReplicaState;

/// Identity and observable state of one replica in the topology model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSpec {
    pub name: String,
    pub state: ReplicaState,
    pub leader: bool,
}

/// Replicas of one shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSpec {
    pub name: String,
    pub replicas: Vec<ReplicaSpec>,
}

/// Replica layout of a collection, grouped by shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionTopology {
    pub collection: String,
    pub shards: Vec<ShardSpec>,
}

impl CollectionTopology {
    pub fn new(collection: impl Into<String>, shards: Vec<ShardSpec>) -> Self {
        Self {
            collection: collection.into(),
            shards,
        }
    }

    /// All replicas across all shards.
    pub fn replicas(&self) -> impl Iterator<Item = &ReplicaSpec> {
        self.shards.iter().flat_map(|shard| shard.replicas.iter())
    }

    pub fn shard(&self, name: &str) -> Option<&ShardSpec> {
        self.shards.iter().find(|shard| shard.name == name)
    }

    /// Names of one shard's replicas, the set leader flips operate on.
    pub fn shard_replicas(&self, shard: &str) -> BTreeSet<String> {
        self.shard(shard)
            .map(|shard| shard.replicas.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }
}
