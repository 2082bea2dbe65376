//! Write intents: named state transitions computed as op batches.
//!
//! Each intent is a pure function from a [`Roster`] snapshot to the minimal
//! ordered list of create/delete ops reaching the desired state. The ops are
//! computed eagerly against the snapshot the intent was constructed with and
//! memoized; the persistence engine recomputes them against a fresh snapshot
//! when the store reports the batch stale.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entry::{ReplicaEntry, ReplicaState};
use crate::snapshot::Roster;
use crate::topology::CollectionTopology;

/// Whether an op creates or deletes a child entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Delete,
}

/// One atomic unit of a write batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub kind: OpKind,
    pub entry: ReplicaEntry,
}

impl WriteOp {
    pub fn create(entry: ReplicaEntry) -> Self {
        Self {
            kind: OpKind::Create,
            entry,
        }
    }

    pub fn delete(entry: ReplicaEntry) -> Self {
        Self {
            kind: OpKind::Delete,
            entry,
        }
    }
}

/// The closed set of state transitions expressible against a roster.
#[derive(Debug, Clone)]
enum IntentKind {
    FlipState {
        replica: String,
        new_state: ReplicaState,
    },
    FlipLeader {
        replicas: BTreeSet<String>,
        next: Option<String>,
    },
    AddReplica {
        replica: String,
        state: ReplicaState,
        leader: bool,
    },
    DeleteReplica {
        replica: String,
    },
    DownReplicas {
        replicas: Vec<String>,
    },
    ToggleTracking {
        enable: bool,
        topology: CollectionTopology,
    },
    Touch,
}

/// One state transition plus the ops computed from the snapshot it was
/// constructed against.
///
/// An intent is a single logical operation: construct a new value per
/// mutation instead of reusing one across threads. `pre_op` says whether the
/// batch must be persisted before the surrounding collection document;
/// [`WriteIntent::touch`] is the only post-op.
#[derive(Debug, Clone)]
pub struct WriteIntent {
    kind: IntentKind,
    pre_op: bool,
    ops: Vec<WriteOp>,
    roster: Option<Roster>,
}

impl WriteIntent {
    fn new(kind: IntentKind, pre_op: bool, roster: Option<&Roster>) -> Self {
        let ops = compute(&kind, roster);
        Self {
            kind,
            pre_op,
            ops,
            roster: roster.cloned(),
        }
    }

    /// Record a lifecycle-state change for one replica. A replica absent
    /// from the snapshot gets a fresh non-leader entry at version 0.
    pub fn flip_state(replica: impl Into<String>, new_state: ReplicaState, roster: &Roster) -> Self {
        Self::new(
            IntentKind::FlipState {
                replica: replica.into(),
                new_state,
            },
            true,
            Some(roster),
        )
    }

    /// Record a leader change for one shard. `replicas` is the shard's full
    /// replica set; `next` is the new leader, or `None` to record an
    /// election gap with no leader. Replicas missing from the snapshot are
    /// skipped.
    pub fn flip_leader(replicas: &BTreeSet<String>, next: Option<&str>, roster: &Roster) -> Self {
        Self::new(
            IntentKind::FlipLeader {
                replicas: replicas.clone(),
                next: next.map(str::to_string),
            },
            true,
            Some(roster),
        )
    }

    /// Record a brand-new replica at version 0. Adding a replica that
    /// already has an entry is a caller error and surfaces as a conflict at
    /// submit time.
    pub fn add_replica(
        replica: impl Into<String>,
        state: ReplicaState,
        leader: bool,
        roster: &Roster,
    ) -> Self {
        Self::new(
            IntentKind::AddReplica {
                replica: replica.into(),
                state,
                leader,
            },
            true,
            Some(roster),
        )
    }

    /// Remove a replica's entry and its whole stale chain. A no-op when the
    /// replica has no entry or the snapshot is unavailable.
    pub fn delete_replica(replica: impl Into<String>, roster: Option<&Roster>) -> Self {
        Self::new(
            IntentKind::DeleteReplica {
                replica: replica.into(),
            },
            true,
            roster,
        )
    }

    /// Mark a batch of replicas Down and not leader. Replicas already Down
    /// and not leader are skipped; replicas absent from the snapshot get a
    /// fresh Down entry at version 0.
    pub fn down_replicas(replicas: &[String], roster: &Roster) -> Self {
        Self::new(
            IntentKind::DownReplicas {
                replicas: replicas.to_vec(),
            },
            true,
            Some(roster),
        )
    }

    /// Switch per-replica tracking on (seed a version-0 entry for every
    /// replica in the topology) or off (delete every entry in the snapshot).
    pub fn toggle_tracking(enable: bool, topology: &CollectionTopology, roster: &Roster) -> Self {
        Self::new(
            IntentKind::ToggleTracking {
                enable,
                topology: topology.clone(),
            },
            true,
            Some(roster),
        )
    }

    /// Advance the node's child counter with no semantic effect: create and
    /// delete one throwaway entry in the same batch. Computed eagerly with
    /// no snapshot; the only intent that runs after the surrounding
    /// collection document is persisted.
    pub fn touch() -> Self {
        Self::new(IntentKind::Touch, false, None)
    }

    /// Whether this batch must be persisted before the surrounding
    /// collection document.
    pub fn is_pre_op(&self) -> bool {
        self.pre_op
    }

    /// Ops computed against the snapshot this intent last saw.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Snapshot the current ops were computed from (none for [`touch`]).
    ///
    /// [`touch`]: Self::touch
    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_ref()
    }

    /// Recompute the ops against a fresh snapshot after a stale-state
    /// conflict.
    pub fn recompute(&mut self, roster: &Roster) -> &[WriteOp] {
        self.ops = compute(&self.kind, Some(roster));
        self.roster = Some(roster.clone());
        &self.ops
    }
}

fn compute(kind: &IntentKind, roster: Option<&Roster>) -> Vec<WriteOp> {
    match kind {
        IntentKind::FlipState { replica, new_state } => {
            let Some(roster) = roster else {
                return Vec::new();
            };
            let mut ops = Vec::with_capacity(2);
            match roster.get(replica) {
                None => ops.push(WriteOp::create(ReplicaEntry::new(
                    replica.clone(),
                    *new_state,
                    false,
                    0,
                ))),
                Some(existing) => {
                    ops.push(WriteOp::create(ReplicaEntry::new(
                        replica.clone(),
                        *new_state,
                        existing.leader,
                        existing.version.saturating_add(1),
                    )));
                    delete_chain(&mut ops, existing);
                }
            }
            tracing::debug!(
                path = roster.path(),
                replica = replica.as_str(),
                new_state = ?new_state,
                ops = ops.len(),
                "flip_state planned"
            );
            ops
        }
        IntentKind::FlipLeader { replicas, next } => {
            let Some(roster) = roster else {
                return Vec::new();
            };
            let mut ops = Vec::new();
            if let Some(next) = next {
                match roster.get(next) {
                    // Already the leader, nothing to record.
                    Some(entry) if entry.leader => {}
                    Some(entry) => {
                        ops.push(WriteOp::create(ReplicaEntry::new(
                            entry.replica.clone(),
                            ReplicaState::Active,
                            true,
                            entry.version.saturating_add(1),
                        )));
                        ops.push(WriteOp::delete(entry.detached()));
                    }
                    // No entry for the new leader yet.
                    None => ops.push(WriteOp::create(ReplicaEntry::new(
                        next.clone(),
                        ReplicaState::Active,
                        true,
                        0,
                    ))),
                }
            }
            // Unset any other replica still marked leader.
            for replica in replicas {
                if Some(replica) == next.as_ref() {
                    continue;
                }
                let Some(entry) = roster.get(replica) else {
                    continue;
                };
                if entry.leader {
                    ops.push(WriteOp::create(ReplicaEntry::new(
                        entry.replica.clone(),
                        entry.state,
                        false,
                        entry.version.saturating_add(1),
                    )));
                    ops.push(WriteOp::delete(entry.detached()));
                }
            }
            tracing::debug!(
                path = roster.path(),
                next = ?next,
                ops = ops.len(),
                "flip_leader planned"
            );
            ops
        }
        IntentKind::AddReplica {
            replica,
            state,
            leader,
        } => {
            vec![WriteOp::create(ReplicaEntry::new(
                replica.clone(),
                *state,
                *leader,
                0,
            ))]
        }
        IntentKind::DeleteReplica { replica } => {
            let mut ops = Vec::new();
            if let Some(roster) = roster {
                if let Some(entry) = roster.get(replica) {
                    delete_chain(&mut ops, entry);
                }
            }
            ops
        }
        IntentKind::DownReplicas { replicas } => {
            let Some(roster) = roster else {
                return Vec::new();
            };
            let mut ops = Vec::new();
            for replica in replicas {
                match roster.get(replica) {
                    Some(entry) => {
                        if entry.state == ReplicaState::Down && !entry.leader {
                            continue;
                        }
                        ops.push(WriteOp::create(ReplicaEntry::new(
                            replica.clone(),
                            ReplicaState::Down,
                            false,
                            entry.version.saturating_add(1),
                        )));
                        delete_chain(&mut ops, entry);
                    }
                    None => ops.push(WriteOp::create(ReplicaEntry::new(
                        replica.clone(),
                        ReplicaState::Down,
                        false,
                        0,
                    ))),
                }
            }
            tracing::debug!(
                path = roster.path(),
                replicas = replicas.len(),
                ops = ops.len(),
                "down_replicas planned"
            );
            ops
        }
        IntentKind::ToggleTracking { enable, topology } => {
            if *enable {
                topology
                    .replicas()
                    .map(|r| WriteOp::create(ReplicaEntry::new(r.name.clone(), r.state, r.leader, 0)))
                    .collect()
            } else {
                let Some(roster) = roster else {
                    return Vec::new();
                };
                roster
                    .entries()
                    .values()
                    .map(|entry| WriteOp::delete(entry.detached()))
                    .collect()
            }
        }
        IntentKind::Touch => {
            let entry = ReplicaEntry::new(
                format!(".touch.{}", unix_time_ns()),
                ReplicaState::Down,
                false,
                0,
            );
            vec![WriteOp::create(entry.clone()), WriteOp::delete(entry)]
        }
    }
}

/// Delete a primary entry and every stale duplicate behind it.
fn delete_chain(ops: &mut Vec<WriteOp>, entry: &ReplicaEntry) {
    ops.push(WriteOp::delete(entry.detached()));
    for dup in entry.stale() {
        ops.push(WriteOp::delete(dup.clone()));
    }
}

/// Nanoseconds since the UNIX epoch; salts the throwaway touch entry. The
/// suffix only has to be unique for the lifetime of one batch.
fn unix_time_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
