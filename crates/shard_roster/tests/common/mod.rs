//! Shared helpers for integration tests.

use shard_roster::{fetch, persist, MemCoordStore, Roster, WriteIntent};

pub const STATE_PATH: &str = "/collections/c1/state.json";

/// Fresh store with an empty state node for `STATE_PATH`.
pub fn empty_store() -> MemCoordStore {
    let store = MemCoordStore::new();
    store.ensure_node(STATE_PATH);
    store
}

/// Latest roster of the state node.
pub fn roster(store: &MemCoordStore) -> Roster {
    fetch(STATE_PATH, store, None).expect("fetch roster")
}

/// Persist an intent against the state node with the default retry bound.
pub fn apply(store: &MemCoordStore, intent: &mut WriteIntent) {
    persist(intent, STATE_PATH, store).expect("persist intent");
}

/// Replica ids currently marked leader, from a fresh read.
pub fn leaders(store: &MemCoordStore) -> Vec<String> {
    roster(store)
        .entries()
        .values()
        .filter(|entry| entry.leader)
        .map(|entry| entry.replica.clone())
        .collect()
}
