//! Immutable snapshots of a coordination node's per-replica entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::entry::ReplicaEntry;

/// All replica states under one coordination node, as of one read.
///
/// Freshness is judged solely by `child_version`: the store bumps the
/// counter on every child add/remove, so a matching counter means the
/// snapshot is byte-identical to what a fresh read would return. The
/// snapshot is immutable and can be shared freely across threads.
#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    path: String,
    child_version: i64,
    entries: BTreeMap<String, ReplicaEntry>,
}

impl Roster {
    /// Build from a raw child listing. Tokens that do not decode are foreign
    /// children and are skipped; several raw entries for one replica fold
    /// into the highest-version one, the rest reachable via
    /// [`ReplicaEntry::stale`].
    pub fn build(
        path: impl Into<String>,
        child_version: i64,
        tokens: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let mut entries: BTreeMap<String, ReplicaEntry> = BTreeMap::new();
        for token in tokens {
            let Some(parsed) = ReplicaEntry::decode(token.as_ref()) else {
                continue;
            };
            let merged = match entries.remove(&parsed.replica) {
                Some(existing) => existing.merge(parsed),
                None => parsed,
            };
            entries.insert(merged.replica.clone(), merged);
        }
        Self {
            path: path.into(),
            child_version,
            entries,
        }
    }

    /// Empty roster for a node that does not exist (counter -1).
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            child_version: -1,
            entries: BTreeMap::new(),
        }
    }

    /// Coordination node this roster was read from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The store's child-version counter at read time.
    pub fn child_version(&self) -> i64 {
        self.child_version
    }

    /// Primary entry for a replica.
    pub fn get(&self, replica: &str) -> Option<&ReplicaEntry> {
        self.entries.get(replica)
    }

    pub fn entries(&self) -> &BTreeMap<String, ReplicaEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON view of the roster for admin/debug surfaces.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}/[{}]: [", self.path, self.child_version)?;
        for (i, entry) in self.entries.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{entry}")?;
            for dup in entry.stale() {
                write!(f, " {dup}")?;
            }
        }
        write!(f, "]}}")
    }
}

/// Replica ids whose observable state differs between two rosters.
///
/// With no `fresh` roster every replica known to `old` counts as modified
/// (full invalidation). Otherwise: ids whose primary entry differs from or
/// is missing in `fresh`, plus ids new in `fresh`. Comparison is by encoded
/// token, so cleanup of stale duplicates alone does not register as a
/// change.
pub fn modified_replicas(old: &Roster, fresh: Option<&Roster>) -> BTreeSet<String> {
    let Some(fresh) = fresh else {
        return old.entries.keys().cloned().collect();
    };
    let mut out = BTreeSet::new();
    for (replica, entry) in &old.entries {
        if fresh.get(replica) != Some(entry) {
            out.insert(replica.clone());
        }
    }
    for replica in fresh.entries.keys() {
        if !old.entries.contains_key(replica) {
            out.insert(replica.clone());
        }
    }
    out
}
