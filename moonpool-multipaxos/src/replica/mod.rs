//! The multi-Paxos replica.
//!
//! A [`Replica`] is a single-writer aggregate: every input (peer message,
//! client request, backoff expiry) is handled to completion through `&mut
//! self` before the next one starts. It plays every role at once: proposer
//! when it leads, acceptor for everybody else's ballots, and learner of
//! chosen values.
//!
//! ## Roles in one replica
//!
//! | Input | Handler | Module |
//! |---|---|---|
//! | client request | [`Replica::on_client_request`] | here |
//! | Prepare / Promise | [`Replica::on_prepare`] / [`Replica::on_promise`] | `election` |
//! | Accept / Accepted / Commit | [`Replica::on_accept`] / [`Replica::on_accepted`] / [`Replica::on_commit`] | `replication` |
//! | backoff expiry | [`Replica::on_backoff_elapsed`] | here |
//!
//! Committed prefixes are drained by the execution driver in `execution`.
//!
//! ## Leadership
//!
//! [`Replica::is_leader`] reports `true` only after this replica collected a
//! phase-1 quorum for its *current* ballot. Owning the current ballot is not
//! enough: an election in flight, or a stale self-owned ballot, does not
//! count.

mod election;
mod execution;
mod replication;


use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};

use crate::backoff::BackoffScheduler;
use crate::config::ReplicaConfig;
use crate::environment::{Environment, StateMachine};
use crate::log::ReplicatedLog;
use crate::messages::Message;
use crate::quorum::{Quorum, QuorumSpec};
use crate::request::ClientRequest;
use crate::types::{Ballot, PaxosError, ReplicaId, Slot};

/// Point-in-time view of a replica, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaStatus {
    /// The replica.
    pub id: ReplicaId,
    /// Highest ballot observed or owned.
    pub ballot: Ballot,
    /// Whether the replica is the active leader of `ballot`.
    pub leader: bool,
    /// Next slot to execute.
    pub execute_cursor: Slot,
    /// Highest slot known to exist.
    pub highest_slot: Slot,
    /// Client requests waiting for leadership.
    pub pending: usize,
    /// Whether a deferred election is outstanding.
    pub backoff_in_flight: bool,
}

/// One replica of the multi-Paxos cluster.
pub struct Replica<E: Environment, M: StateMachine> {
    id: ReplicaId,
    env: E,
    machine: M,
    quorums: QuorumSpec,
    log: ReplicatedLog,

    /// Highest ballot observed or owned. Never decreases.
    ballot: Ballot,

    /// Phase-1 quorum secured for `ballot` and not preempted since.
    active: bool,

    /// Promises for the election in flight.
    phase1_acks: Quorum,

    /// Requests received while not leading, proposed in order once leading.
    pending: VecDeque<ClientRequest>,

    backoff: BackoffScheduler,
}

impl<E: Environment, M: StateMachine> Replica<E, M> {
    /// Create a replica.
    ///
    /// Fails if the configured quorums do not fit the environment's cluster.
    pub fn new(env: E, machine: M, config: &ReplicaConfig) -> Result<Self, PaxosError> {
        let quorums = config.quorums(env.cluster_size())?;
        let id = env.id();
        info!(
            replica = %id,
            cluster_size = quorums.cluster_size(),
            phase1_quorum = quorums.phase1(),
            phase2_quorum = quorums.phase2(),
            "replica created"
        );
        Ok(Self {
            id,
            env,
            machine,
            quorums,
            log: ReplicatedLog::new(),
            ballot: Ballot::ZERO,
            active: false,
            phase1_acks: Quorum::new(),
            pending: VecDeque::new(),
            backoff: BackoffScheduler::new(config.backoff()),
        })
    }

    /// This replica's identity.
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Highest ballot observed or owned.
    pub fn ballot(&self) -> Ballot {
        self.ballot
    }

    /// Whether this replica is the active leader of its current ballot.
    pub fn is_leader(&self) -> bool {
        self.active
    }

    /// Owner of the current ballot: the leader, or the replica trying to be.
    pub fn leader(&self) -> Option<ReplicaId> {
        self.ballot.owner()
    }

    /// The replicated log.
    pub fn log(&self) -> &ReplicatedLog {
        &self.log
    }

    /// Quorum thresholds in use.
    pub fn quorums(&self) -> QuorumSpec {
        self.quorums
    }

    /// Number of requests waiting for leadership.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether a deferred election is outstanding.
    pub fn backoff_in_flight(&self) -> bool {
        self.backoff.in_flight()
    }

    /// The environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// The environment, mutably.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// The state machine.
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Snapshot of the replica's state.
    pub fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            id: self.id,
            ballot: self.ballot,
            leader: self.active,
            execute_cursor: self.log.execute_cursor(),
            highest_slot: self.log.highest_slot(),
            pending: self.pending.len(),
            backoff_in_flight: self.backoff.in_flight(),
        }
    }

    /// Dispatch a peer message to its handler.
    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Prepare(m) => self.on_prepare(m),
            Message::Promise(m) => self.on_promise(m),
            Message::Accept(m) => self.on_accept(m),
            Message::Accepted(m) => self.on_accepted(m),
            Message::Commit(m) => self.on_commit(m),
        }
    }

    /// Accept a client request.
    ///
    /// A leader proposes it right away. Otherwise it waits in the pending
    /// queue, and an election starts unless this replica already has one in
    /// flight for its own ballot.
    pub fn on_client_request(&mut self, request: ClientRequest) {
        if self.active {
            self.propose(request);
            return;
        }

        self.pending.push_back(request);
        debug!(
            replica = %self.id,
            ballot = %self.ballot,
            pending = self.pending.len(),
            "queued client request until leadership"
        );
        if !self.ballot.is_owned_by(self.id) {
            self.start_election();
        }
    }

    /// The deferred election scheduled by a preemption is due.
    pub fn on_backoff_elapsed(&mut self) {
        debug!(replica = %self.id, ballot = %self.ballot, "backoff elapsed");
        self.start_election();
        self.backoff.fired();
    }

    /// Adopt `ballot` if it is strictly higher, stepping down.
    ///
    /// Returns whether the ballot was adopted.
    fn observe_ballot(&mut self, ballot: Ballot) -> bool {
        if ballot <= self.ballot {
            return false;
        }
        if self.active {
            info!(
                replica = %self.id,
                ballot = %self.ballot,
                preempted_by = %ballot,
                "preempted, stepping down"
            );
        }
        self.ballot = ballot;
        self.active = false;
        true
    }

    /// Requests this replica still has to get agreed on.
    fn has_outstanding_work(&self) -> bool {
        !self.pending.is_empty() || self.log.has_owned_uncommitted()
    }

    /// Schedule one deferred election unless one is already outstanding.
    fn schedule_backoff(&mut self) {
        if let Some(delay) = self.backoff.arm(self.env.random()) {
            debug!(
                replica = %self.id,
                delay_ms = delay.as_millis() as u64,
                "scheduling deferred election"
            );
            self.env.schedule_election(delay);
        }
    }

    /// Hand a request whose slot went to another command back for retry.
    fn retry_request(&mut self, slot: Slot, request: ClientRequest) {
        debug!(
            replica = %self.id,
            slot = %slot,
            "slot taken by another command, retrying request"
        );
        self.env.retry(request);
    }
}
