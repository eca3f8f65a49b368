//! Core types for the multi-instance Paxos replica.
//!
//! - [`ReplicaId`]: Identity of one replica in the cluster
//! - [`Ballot`]: Totally ordered `(round, owner)` token establishing leadership
//! - [`Slot`]: Position in the agreed command sequence
//! - [`Command`]: What a slot holds (a client payload or a gap-filling no-op)
//! - [`PaxosError`]: Error type for the fallible edges of the crate

use serde::{Deserialize, Serialize};

/// Identity of a replica.
///
/// Replica identities are compared when two ballots share the same round,
/// so their ordering must be the same on every replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub u64);

impl ReplicaId {
    /// Create a new replica identity.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "replica({})", self.0)
    }
}

/// Ballot: the leadership token of multi-Paxos.
///
/// In Raft terms, this is a **term number** that also names its candidate.
/// Ballots compare lexicographically: first by `round`, then by `owner`, so
/// two replicas that start an election in the same round never produce
/// equal ballots.
///
/// # Invariants
///
/// - A replica's current ballot never decreases.
/// - [`Ballot::next`] is strictly greater than the ballot it is derived from.
/// - [`Ballot::ZERO`] has no owner and is lower than every owned ballot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Ballot {
    round: u64,
    owner: Option<ReplicaId>,
}

impl Ballot {
    /// The initial ballot `(0, unset)`, representing "no ballot seen yet."
    pub const ZERO: Self = Self {
        round: 0,
        owner: None,
    };

    /// Create a ballot owned by `owner`.
    pub const fn new(round: u64, owner: ReplicaId) -> Self {
        Self {
            round,
            owner: Some(owner),
        }
    }

    /// The round component.
    pub const fn round(&self) -> u64 {
        self.round
    }

    /// The replica that owns this ballot, `None` for [`Ballot::ZERO`].
    pub const fn owner(&self) -> Option<ReplicaId> {
        self.owner
    }

    /// Whether `id` owns this ballot.
    pub fn is_owned_by(&self, id: ReplicaId) -> bool {
        self.owner == Some(id)
    }

    /// The next ballot for `owner`, strictly greater than `self`.
    pub const fn next(self, owner: ReplicaId) -> Self {
        Self {
            round: self.round + 1,
            owner: Some(owner),
        }
    }
}

impl std::fmt::Display for Ballot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner {
            Some(owner) => write!(f, "ballot({}.{})", self.round, owner.0),
            None => write!(f, "ballot({}.-)", self.round),
        }
    }
}

/// Log slot: a position in the replicated log.
///
/// In Raft terms, a **log index**. Slot 0 is a permanent, already-committed
/// sentinel; client commands start at [`Slot::FIRST`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Slot(pub u64);

impl Slot {
    /// The sentinel slot that anchors the execution baseline.
    pub const SENTINEL: Self = Self(0);

    /// The first slot that can hold a command.
    pub const FIRST: Self = Self(1);

    /// Create a new slot.
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The next sequential slot.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot({})", self.0)
    }
}

/// The value a slot agrees on.
///
/// Client payloads are raw bytes to keep the protocol generic over the
/// application's command type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Fills a slot a new leader found empty. Never reaches the state machine.
    Noop,
    /// A serialized client command.
    Client(Vec<u8>),
}

impl Command {
    /// The client payload, `None` for [`Command::Noop`].
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Command::Noop => None,
            Command::Client(bytes) => Some(bytes),
        }
    }
}

/// Errors surfaced by the fallible edges of the crate.
///
/// Protocol handlers never fail: stale or duplicate messages are dropped.
/// Errors only come from configuration, encoding, and the async driver.
#[derive(Debug, thiserror::Error)]
pub enum PaxosError {
    /// The configuration is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Phase-1 and phase-2 quorums would not intersect.
    #[error("quorums do not intersect: q1={phase1} + q2={phase2} <= n={cluster_size}")]
    QuorumOverlap {
        /// Phase-1 quorum size.
        phase1: usize,
        /// Phase-2 quorum size.
        phase2: usize,
        /// Number of replicas.
        cluster_size: usize,
    },

    /// Serialization or deserialization error.
    #[error("codec error: {0}")]
    Codec(String),

    /// The replica driver has stopped and no longer accepts events.
    #[error("replica driver shut down")]
    Shutdown,

    /// The reply channel was dropped before the command executed.
    ///
    /// Happens when the driver stops while the request is still in flight.
    #[error("reply dropped before execution")]
    ReplyDropped,
}
