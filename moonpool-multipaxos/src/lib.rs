//! # Moonpool Multi-Paxos: a replicated log core
//!
//! This crate implements the replica of a multi-instance ("multi-decree")
//! Paxos cluster. Every replica is at once proposer, acceptor and learner.
//! A replica that wins phase 1 for a ballot leads: it assigns client commands
//! to consecutive log slots, gets each slot accepted by a phase-2 quorum, and
//! announces the chosen value. Every replica executes chosen commands in slot
//! order against its own copy of the state machine.
//!
//! ## Multi-Paxos vs Raft: A Mental Model
//!
//! | Multi-Paxos Concept | Raft Equivalent | Notes |
//! |---|---|---|
//! | **Ballot** `(round, owner)` | Term | Owner breaks ties, so ballots never collide |
//! | **Slot** | Log index | Slot 0 is a pre-committed sentinel |
//! | **Prepare / Promise** | RequestVote | Promises carry the responder's log suffix |
//! | **Accept / Accepted** | AppendEntries | One slot per message |
//! | **Commit** | Leader commit index | Announced per slot |
//! | **Backoff** | Election timeout | Randomized, armed only on preemption |
//!
//! ## Key Differences from Raft
//!
//! 1. **Any replica may hold any value**: a new leader does not need the most
//!    up-to-date log. It merges the logs reported in phase 1, keeping the
//!    highest-ballot value per slot, and re-proposes everything not yet
//!    chosen under its own ballot.
//!
//! 2. **Gaps are legal**: slots can be accepted out of order. A new leader
//!    fills gaps with no-ops; execution stops at the first gap.
//!
//! 3. **Flexible quorums**: the phase-1 and phase-2 quorums only need to
//!    intersect (`q1 + q2 > n`), see [`QuorumSpec`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              ReplicaDriver (async actor)                 │
//! │   inbox: peer messages, client requests, backoff timer   │
//! └──────────────────────┬───────────────────────────────────┘
//!                        │ one event at a time
//!                        ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Replica (sans-IO)                      │
//! │   election: Prepare / Promise, merge, take over          │
//! │   replication: Accept / Accepted / Commit                │
//! │   execution: apply the committed prefix                  │
//! └───────────┬──────────────────────────────┬───────────────┘
//!             │ Environment                  │ StateMachine
//!             ▼                              ▼
//! ┌───────────────────────┐      ┌───────────────────────────┐
//! │ Transport, timers,    │      │ Application state         │
//! │ randomness            │      │                           │
//! └───────────────────────┘      └───────────────────────────┘
//! ```
//!
//! ## Crate Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | `ReplicaId`, `Ballot`, `Slot`, `Command`, `PaxosError` |
//! | [`quorum`] | Acknowledgement sets and quorum thresholds |
//! | [`log`] | The slot-indexed log and its execution cursor |
//! | [`messages`] | Protocol messages |
//! | [`codec`] | Wire serialization of messages |
//! | [`request`] | Client requests and replies |
//! | [`config`] | Replica configuration |
//! | [`backoff`] | Randomized re-election backoff |
//! | [`providers`] | Time, task and randomness providers |
//! | [`environment`] | `Environment` and `StateMachine` traits |
//! | [`replica`] | The replica core |
//! | [`driver`] | Async actor driving a replica |
//!
//! ## Durability
//!
//! The log and ballot are kept in memory only. A replica that restarts
//! rejoins as a blank acceptor and must not have voted before the restart.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod backoff;
pub mod codec;
pub mod config;
pub mod driver;
pub mod environment;
pub mod log;
pub mod messages;
pub mod providers;
pub mod quorum;
pub mod replica;
pub mod request;
pub mod types;

// Re-export key types at crate root for convenience
pub use backoff::{BackoffPolicy, BackoffScheduler};
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use config::ReplicaConfig;
pub use driver::{LocalTransport, ReplicaDriver, ReplicaEvent, ReplicaHandle, Transport};
pub use environment::{Environment, StateMachine};
pub use log::{EntryStatus, LogEntry, ReplicatedLog, SlotState};
pub use messages::Message;
pub use providers::{
    Providers, RandomProvider, SeededRandomProvider, TaskProvider, TimeProvider, TokioProviders,
};
pub use quorum::{Quorum, QuorumSpec};
pub use replica::{Replica, ReplicaStatus};
pub use request::{ClientRequest, CommandReply};
pub use types::{Ballot, Command, PaxosError, ReplicaId, Slot};
