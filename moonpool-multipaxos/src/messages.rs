//! Protocol messages exchanged between replicas.
//!
//! ```text
//! Candidate                         Peer
//!   │── Prepare(ballot, from) ──────>│  phase 1: broadcast
//!   │<── Promise(ballot, log) ───────│  unicast to the ballot owner
//!   │                                │
//!   │── Accept(ballot, slot, cmd) ──>│  phase 2: broadcast
//!   │<── Accepted(ballot, slot) ─────│  unicast to the ballot owner
//!   │                                │
//!   │── Commit(ballot, slot, cmd) ──>│  chosen value announced
//! ```
//!
//! Every reply carries the *responder's* current ballot, which is how a
//! stale proposer learns it has been superseded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Ballot, Command, ReplicaId, Slot};

/// Phase-1 request: "promise not to accept lower ballots."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepare {
    /// The candidate's new ballot.
    pub ballot: Ballot,

    /// First slot the candidate has not executed yet.
    ///
    /// Peers report everything they know from here on, including values
    /// they have already executed.
    pub from: Slot,
}

/// What a promiser knows about one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromisedEntry {
    /// The command held by the slot.
    pub command: Command,

    /// The ballot the command was accepted under.
    pub ballot: Ballot,

    /// Whether the promiser knows the value is chosen.
    pub committed: bool,
}

/// Phase-1 reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    /// The responder's current ballot.
    pub ballot: Ballot,

    /// The responder.
    pub sender: ReplicaId,

    /// Slots the responder knows about, from the prepare's `from` slot.
    pub log: BTreeMap<Slot, PromisedEntry>,
}

/// Phase-2 request: "accept this command for this slot."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    /// The proposer's ballot.
    pub ballot: Ballot,

    /// The slot being proposed.
    pub slot: Slot,

    /// The proposed command.
    pub command: Command,
}

/// Phase-2 reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    /// The responder's current ballot.
    pub ballot: Ballot,

    /// The slot the accept was for.
    pub slot: Slot,

    /// The responder.
    pub sender: ReplicaId,
}

/// Announcement that a slot's value is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// The ballot the value was chosen under.
    pub ballot: Ballot,

    /// The chosen slot.
    pub slot: Slot,

    /// The chosen command.
    pub command: Command,
}

/// Any message a replica sends to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Phase-1 request.
    Prepare(Prepare),
    /// Phase-1 reply.
    Promise(Promise),
    /// Phase-2 request.
    Accept(Accept),
    /// Phase-2 reply.
    Accepted(Accepted),
    /// Chosen value.
    Commit(Commit),
}

impl Message {
    /// The ballot carried by the message.
    pub fn ballot(&self) -> Ballot {
        match self {
            Message::Prepare(m) => m.ballot,
            Message::Promise(m) => m.ballot,
            Message::Accept(m) => m.ballot,
            Message::Accepted(m) => m.ballot,
            Message::Commit(m) => m.ballot,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Prepare(_) => "prepare",
            Message::Promise(_) => "promise",
            Message::Accept(_) => "accept",
            Message::Accepted(_) => "accepted",
            Message::Commit(_) => "commit",
        }
    }
}

impl From<Prepare> for Message {
    fn from(m: Prepare) -> Self {
        Message::Prepare(m)
    }
}

impl From<Promise> for Message {
    fn from(m: Promise) -> Self {
        Message::Promise(m)
    }
}

impl From<Accept> for Message {
    fn from(m: Accept) -> Self {
        Message::Accept(m)
    }
}

impl From<Accepted> for Message {
    fn from(m: Accepted) -> Self {
        Message::Accepted(m)
    }
}

impl From<Commit> for Message {
    fn from(m: Commit) -> Self {
        Message::Commit(m)
    }
}
