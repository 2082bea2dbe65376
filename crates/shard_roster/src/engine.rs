//! Persistence of write intents with stale-state retry.
//!
//! The store's atomic multi-op is the only ordering primitive: a batch
//! applies all-or-nothing, and a create collision or delete miss means the
//! snapshot the batch was computed from no longer matches the node. That
//! conflict is absorbed here by refetching and recomputing, up to a bound;
//! everything else (transport faults, interruption) surfaces immediately.

use thiserror::Error;

use crate::intent::{WriteIntent, WriteOp};
use crate::snapshot::Roster;
use crate::store::{CoordStore, StoreError};

/// Tuning for the persistence retry loop.
#[derive(Debug, Clone, Copy)]
pub struct PersisterConfig {
    /// Submission attempts before a persistent conflict becomes fatal.
    pub max_attempts: usize,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

/// Why an intent could not be persisted.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The snapshot kept going stale across every attempt: some concurrent
    /// writer is mutating the same node set faster than we can recompute.
    #[error("conflicting writes on {path}: still stale after {attempts} attempts")]
    RetriesExhausted {
        path: String,
        attempts: usize,
        #[source]
        last: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives one [`WriteIntent`] to durability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Persister {
    config: PersisterConfig,
}

impl Persister {
    pub fn new(config: PersisterConfig) -> Self {
        Self { config }
    }

    /// Persist `intent` under the coordination node `path`.
    ///
    /// The intent's memoized ops are submitted as one atomic batch. On a
    /// conflict a fresh [`Roster`] is fetched and the ops recomputed against
    /// it; a conflict that survives every attempt surfaces as
    /// [`PersistError::RetriesExhausted`]. An intent whose ops are empty is
    /// a no-op and never contacts the store.
    pub fn persist(
        &self,
        intent: &mut WriteIntent,
        path: &str,
        store: &dyn CoordStore,
    ) -> Result<(), PersistError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_conflict = None;
        for attempt in 0..attempts {
            match submit_once(intent.ops(), path, store) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_conflict() => {
                    tracing::info!(path, attempt, "stale per-replica state, retrying");
                    let fresh = fetch(path, store, None)?;
                    intent.recompute(&fresh);
                    last_conflict = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }
        let last = last_conflict.expect("retry loop always records a conflict before exhausting");
        tracing::warn!(path, attempts, error = %last, "per-replica state persist exhausted retries");
        Err(PersistError::RetriesExhausted {
            path: path.to_string(),
            attempts,
            last,
        })
    }
}

/// Persist with the default retry bound.
pub fn persist(
    intent: &mut WriteIntent,
    path: &str,
    store: &dyn CoordStore,
) -> Result<(), PersistError> {
    Persister::default().persist(intent, path, store)
}

/// Submit one op batch without retry. An empty batch is a no-op and does not
/// contact the store.
pub fn submit_once(ops: &[WriteOp], path: &str, store: &dyn CoordStore) -> Result<(), StoreError> {
    if ops.is_empty() {
        return Ok(());
    }
    tracing::debug!(path, ops = ops.len(), "submitting per-replica state batch");
    store.submit(path, ops).map_err(|err| {
        if !err.is_conflict() {
            tracing::warn!(path, error = %err, "per-replica state batch failed");
        }
        err
    })
}

/// Latest roster for `path`.
///
/// With `previous` the node is stat-ed first: a missing node yields an empty
/// roster at counter -1, and an unchanged child-version counter returns
/// `previous` as-is without re-reading or re-parsing the children.
/// Otherwise the child listing plus counter are read in one call and a
/// fresh roster is built.
pub fn fetch(
    path: &str,
    store: &dyn CoordStore,
    previous: Option<&Roster>,
) -> Result<Roster, StoreError> {
    if let Some(previous) = previous {
        let Some(stat) = store.stat(path)? else {
            return Ok(Roster::absent(path));
        };
        if stat.child_version == previous.child_version() {
            return Ok(previous.clone());
        }
    }
    let listing = store.children(path)?;
    Ok(Roster::build(path, listing.child_version, listing.names))
}
