//! Per-replica state entries and their token codec.
//!
//! A replica's observable state is stored entirely in the *name* of a child
//! node under the collection's coordination node: `replica:version:state`
//! plus a trailing `:L` when the replica is the shard leader. Entries are
//! immutable; a state change writes a new entry with a higher version and
//! deletes the old one.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Field separator inside an encoded token.
pub const SEPARATOR: char = ':';

/// Lifecycle state of a replica.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReplicaState {
    Active,
    Down,
    Recovering,
    RecoveryFailed,
}

impl ReplicaState {
    /// Single-letter code used in the encoded token.
    pub fn code(self) -> &'static str {
        match self {
            ReplicaState::Active => "A",
            ReplicaState::Down => "D",
            ReplicaState::Recovering => "R",
            ReplicaState::RecoveryFailed => "F",
        }
    }

    /// Inverse of [`code`](Self::code). Unknown codes mark foreign tokens.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(ReplicaState::Active),
            "D" => Some(ReplicaState::Down),
            "R" => Some(ReplicaState::Recovering),
            "F" => Some(ReplicaState::RecoveryFailed),
            _ => None,
        }
    }
}

/// Recorded state of one replica.
///
/// `encoded` is fixed at construction and is a pure function of the other
/// fields; two entries are equal iff their encoded tokens are equal. When a
/// replica has several raw children (an updater crashed between create and
/// delete), the older ones ride along in `stale`, ordered newest to oldest.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaEntry {
    pub replica: String,
    pub state: ReplicaState,
    pub leader: bool,
    pub version: u32,
    #[serde(skip)]
    encoded: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stale: Vec<ReplicaEntry>,
}

impl ReplicaEntry {
    pub fn new(
        replica: impl Into<String>,
        state: ReplicaState,
        leader: bool,
        version: u32,
    ) -> Self {
        let replica = replica.into();
        let mut encoded = format!("{replica}{SEPARATOR}{version}{SEPARATOR}{}", state.code());
        if leader {
            encoded.push(SEPARATOR);
            encoded.push('L');
        }
        Self {
            replica,
            state,
            leader,
            version,
            encoded,
            stale: Vec::new(),
        }
    }

    /// Parse a raw child name. Returns `None` for anything this subsystem
    /// does not own: fewer than three fields, an unparseable version, or an
    /// unknown state code. The raw token is kept as the encoded form so that
    /// a later delete targets the child by its actual name.
    pub fn decode(token: &str) -> Option<Self> {
        let fields: Vec<&str> = token.split(SEPARATOR).collect();
        if fields.len() < 3 {
            return None;
        }
        let version: u32 = fields[1].parse().ok()?;
        let state = ReplicaState::from_code(fields[2])?;
        let leader = fields.get(3).map(|f| *f == "L").unwrap_or(false);
        Some(Self {
            replica: fields[0].to_string(),
            state,
            leader,
            version,
            encoded: token.to_string(),
            stale: Vec::new(),
        })
    }

    /// The canonical token, also the child node's name.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Superseded entries for this replica, newest first.
    pub fn stale(&self) -> &[ReplicaEntry] {
        &self.stale
    }

    /// Copy of this entry without its stale chain.
    pub fn detached(&self) -> ReplicaEntry {
        ReplicaEntry {
            stale: Vec::new(),
            ..self.clone()
        }
    }

    /// Fold `other`, another entry for the same replica, into this one. The
    /// higher version stays primary and everything else lands in `stale`,
    /// sorted by descending version. On a version tie the incumbent keeps
    /// primacy and `other` becomes its duplicate.
    pub fn merge(self, other: ReplicaEntry) -> ReplicaEntry {
        debug_assert_eq!(self.replica, other.replica);
        let (mut primary, mut loser) = if other.version > self.version {
            (other, self)
        } else {
            (self, other)
        };
        let mut stale = std::mem::take(&mut primary.stale);
        stale.append(&mut loser.stale);
        stale.push(loser);
        // Stable sort keeps arrival order deterministic for equal versions.
        stale.sort_by(|a, b| b.version.cmp(&a.version));
        primary.stale = stale;
        primary
    }
}

impl PartialEq for ReplicaEntry {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for ReplicaEntry {}

impl Hash for ReplicaEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl fmt::Display for ReplicaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Replica id prefix of a raw token, if it has one.
pub fn replica_of(token: &str) -> Option<&str> {
    match token.find(SEPARATOR) {
        Some(idx) if idx > 0 => Some(&token[..idx]),
        _ => None,
    }
}
