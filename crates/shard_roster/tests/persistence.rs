//! End-to-end persistence tests against the in-memory coordination store:
//! leader exclusivity, stale-state retry, no-op short-circuits, and the
//! counter-gated snapshot cache.

mod common;

use std::collections::BTreeSet;

use common::{apply, empty_store, leaders, roster, STATE_PATH};
use shard_roster::{
    fetch, persist, modified_replicas, PersistError, ReplicaState, WriteIntent,
};

#[test]
fn flip_leader_leaves_exactly_one_leader() {
    let store = empty_store();
    for replica in ["r1", "r2", "r3"] {
        let rs = roster(&store);
        apply(
            &store,
            &mut WriteIntent::add_replica(replica, ReplicaState::Active, replica == "r1", &rs),
        );
    }
    assert_eq!(leaders(&store), vec!["r1".to_string()]);

    let all: BTreeSet<String> = ["r1", "r2", "r3"].into_iter().map(str::to_string).collect();
    let rs = roster(&store);
    apply(&store, &mut WriteIntent::flip_leader(&all, Some("r2"), &rs));

    assert_eq!(leaders(&store), vec!["r2".to_string()]);
    let after = roster(&store);
    assert_eq!(after.get("r2").expect("r2").version, 1);
    assert_eq!(after.get("r2").expect("r2").state, ReplicaState::Active);
    assert!(!after.get("r1").expect("r1").leader);
    assert!(after.entries().values().all(|e| e.stale().is_empty()));
}

#[test]
fn persist_retries_through_conflicts_and_converges() {
    let store = empty_store();
    let rs = roster(&store);
    apply(
        &store,
        &mut WriteIntent::add_replica("r1", ReplicaState::Active, false, &rs),
    );

    let baseline = store.submissions();
    store.inject_conflicts(2);
    let rs = roster(&store);
    let mut intent = WriteIntent::flip_state("r1", ReplicaState::Down, &rs);
    persist(&mut intent, STATE_PATH, &store).expect("persist with retries");

    // Two rejected attempts plus the accepted one.
    assert_eq!(store.submissions() - baseline, 3);
    let after = roster(&store);
    let entry = after.get("r1").expect("r1");
    assert_eq!(entry.state, ReplicaState::Down);
    assert_eq!(entry.version, 1);
    assert!(entry.stale().is_empty());
}

#[test]
fn a_stale_intent_recomputes_against_the_winning_generation() {
    let store = empty_store();
    let rs = roster(&store);
    apply(
        &store,
        &mut WriteIntent::add_replica("r1", ReplicaState::Active, false, &rs),
    );

    // Two writers plan against the same snapshot; the first one wins the
    // generation and the second conflicts, refetches, and lands on top.
    let shared = roster(&store);
    let mut winner = WriteIntent::flip_state("r1", ReplicaState::Recovering, &shared);
    let mut loser = WriteIntent::down_replicas(&["r1".to_string()], &shared);

    apply(&store, &mut winner);
    persist(&mut loser, STATE_PATH, &store).expect("loser retries");

    let after = roster(&store);
    let entry = after.get("r1").expect("r1");
    // Down landed on top of the winner's Recovering entry, not over v0.
    assert_eq!(entry.state, ReplicaState::Down);
    assert_eq!(entry.version, 2);
    assert!(entry.stale().is_empty());
}

#[test]
fn persistent_conflict_exhausts_retries() {
    let store = empty_store();
    let rs = roster(&store);
    apply(
        &store,
        &mut WriteIntent::add_replica("r1", ReplicaState::Active, false, &rs),
    );

    store.inject_conflicts(u32::MAX);
    let rs = roster(&store);
    let mut intent = WriteIntent::flip_state("r1", ReplicaState::Down, &rs);
    let err = persist(&mut intent, STATE_PATH, &store).expect_err("exhaustion");
    match err {
        PersistError::RetriesExhausted { path, attempts, last } => {
            assert_eq!(path, STATE_PATH);
            assert_eq!(attempts, 10);
            assert!(last.is_conflict());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn retry_bound_is_configurable() {
    use shard_roster::{Persister, PersisterConfig};

    let store = empty_store();
    store.inject_conflicts(u32::MAX);
    let rs = roster(&store);
    let mut intent = WriteIntent::add_replica("r1", ReplicaState::Active, false, &rs);
    let persister = Persister::new(PersisterConfig { max_attempts: 2 });
    let err = persister
        .persist(&mut intent, STATE_PATH, &store)
        .expect_err("exhaustion");
    match err {
        PersistError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.submissions(), 2);
}

#[test]
fn settled_down_replicas_never_contact_the_store() {
    let store = empty_store();
    let rs = roster(&store);
    apply(
        &store,
        &mut WriteIntent::add_replica("r1", ReplicaState::Down, false, &rs),
    );

    let baseline = store.submissions();
    let rs = roster(&store);
    let mut intent = WriteIntent::down_replicas(&["r1".to_string()], &rs);
    assert!(intent.ops().is_empty());
    persist(&mut intent, STATE_PATH, &store).expect("no-op persist");
    assert_eq!(store.submissions(), baseline);
}

#[test]
fn toggle_tracking_seeds_and_tears_down() {
    use shard_roster::{CollectionTopology, ReplicaSpec, ShardSpec};

    let store = empty_store();
    let topology = CollectionTopology::new(
        "c1",
        vec![ShardSpec {
            name: "shard1".to_string(),
            replicas: vec![
                ReplicaSpec {
                    name: "r1".to_string(),
                    state: ReplicaState::Active,
                    leader: true,
                },
                ReplicaSpec {
                    name: "r2".to_string(),
                    state: ReplicaState::Down,
                    leader: false,
                },
            ],
        }],
    );

    let rs = roster(&store);
    apply(&store, &mut WriteIntent::toggle_tracking(true, &topology, &rs));
    let seeded = roster(&store);
    assert_eq!(seeded.len(), 2);
    assert!(seeded.entries().values().all(|e| e.version == 0));
    assert_eq!(leaders(&store), vec!["r1".to_string()]);

    apply(
        &store,
        &mut WriteIntent::toggle_tracking(false, &topology, &seeded),
    );
    assert!(roster(&store).is_empty());
}

#[test]
fn touch_advances_the_counter_without_residue() {
    let store = empty_store();
    let before = roster(&store);

    apply(&store, &mut WriteIntent::touch());

    let after = roster(&store);
    assert!(after.child_version() > before.child_version());
    assert!(after.is_empty());
    assert!(modified_replicas(&before, Some(&after)).is_empty());
}

#[test]
fn fetch_reuses_an_unchanged_roster() {
    let store = empty_store();
    let rs = roster(&store);
    apply(
        &store,
        &mut WriteIntent::add_replica("r1", ReplicaState::Active, false, &rs),
    );

    let first = roster(&store);
    let listings = store.listings();
    let reused = fetch(STATE_PATH, &store, Some(&first)).expect("fetch with previous");
    // Counter unchanged: the previous roster comes back without a re-read.
    assert_eq!(store.listings(), listings);
    assert_eq!(reused.child_version(), first.child_version());

    let rs = roster(&store);
    apply(&store, &mut WriteIntent::flip_state("r1", ReplicaState::Down, &rs));
    let fresh = fetch(STATE_PATH, &store, Some(&first)).expect("fetch after change");
    assert!(fresh.child_version() > first.child_version());
    assert_eq!(
        fresh.get("r1").expect("r1").state,
        ReplicaState::Down
    );
}

#[test]
fn fetch_of_a_vanished_node_is_an_absent_roster() {
    let store = empty_store();
    let seen = roster(&store);
    let absent = fetch("/collections/gone/state.json", &store, Some(&seen)).expect("fetch");
    assert_eq!(absent.child_version(), -1);
    assert!(absent.is_empty());
}
