//! Per-replica lifecycle state tracked as immutable children of a versioned
//! coordination node.
//!
//! Instead of one large, frequently contended state document, every replica
//! of a sharded collection gets its own child entry whose *name* encodes its
//! state (`replica:version:state[:L]`). Unrelated replicas change state
//! without conflicting with each other, and any reader reconstructs a
//! consistent snapshot by checking a single child-version counter.
//!
//! Writes go through [`WriteIntent`] values, each a pure computation from a
//! [`Roster`] snapshot to the minimal create/delete batch expressing one
//! state transition. [`Persister`] submits the batch as one atomic multi-op
//! and, when the store reports the snapshot stale, refetches and recomputes
//! under a bounded retry. This is optimistic concurrency, not locking:
//! conflicting writers race, and whoever loses the generation retries
//! against the next one.

pub mod engine;
pub mod entry;
pub mod intent;
pub mod sim;
pub mod snapshot;
pub mod store;
pub mod topology;

pub use engine::{fetch, persist, PersistError, Persister, PersisterConfig};
pub use entry::{replica_of, ReplicaEntry, ReplicaState, SEPARATOR};
pub use intent::{OpKind, WriteIntent, WriteOp};
pub use sim::MemCoordStore;
pub use snapshot::{modified_replicas, Roster};
pub use store::{ChildListing, CoordStore, NodeStat, StoreError};
pub use topology::{CollectionTopology, ReplicaSpec, ShardSpec};
