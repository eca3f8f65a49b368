//! Phase 2: replication and commit.
//!
//! The leader assigns each command a slot and broadcasts `Accept`. Acceptors
//! vote by storing the value and answering `Accepted` with their current
//! ballot. Once a phase-2 quorum acknowledged the slot under the leader's
//! ballot the value is chosen: the leader commits it and broadcasts `Commit`
//! so every replica can execute it.
//!
//! A vote is never treated as a decision. An acceptor keeps the entry in the
//! accepted state until a `Commit` (or a committed entry in a promise) says
//! otherwise.

use tracing::{debug, info, warn};

use super::Replica;
use crate::environment::{Environment, StateMachine};
use crate::log::LogEntry;
use crate::messages::{Accept, Accepted, Commit};
use crate::request::ClientRequest;
use crate::types::{Command, Slot};

impl<E: Environment, M: StateMachine> Replica<E, M> {
    // =========================================================================
    // Leader
    // =========================================================================

    /// Assign `request` the next slot and broadcast it.
    ///
    /// Only called while active.
    pub(super) fn propose(&mut self, request: ClientRequest) {
        debug_assert!(self.active, "only the leader proposes");

        let id = self.id;
        let ballot = self.ballot;
        let now = self.env.now();
        let slot = self.log.allocate_slot();
        let command = Command::Client(request.command().to_vec());

        let entry = self.log.insert(
            slot,
            LogEntry::proposal(ballot, command.clone(), Some(request), now),
        );
        entry.acks_mut().ack(id);

        debug!(replica = %id, ballot = %ballot, slot = %slot, "proposing");
        self.env.broadcast(
            Accept {
                ballot,
                slot,
                command,
            }
            .into(),
        );

        self.check_phase2(slot);
    }

    /// Handle a vote for one of this replica's proposals.
    pub fn on_accepted(&mut self, msg: Accepted) {
        let Some(entry) = self.log.get(msg.slot) else {
            warn!(
                replica = %self.id,
                slot = %msg.slot,
                sender = %msg.sender,
                "accepted for unknown slot"
            );
            return;
        };

        if entry.is_committed() || msg.ballot < entry.ballot() {
            return;
        }
        let entry_ballot = entry.ballot();

        if self.observe_ballot(msg.ballot) {
            if self.has_outstanding_work() {
                self.schedule_backoff();
            }
            return;
        }

        if msg.ballot != self.ballot || msg.ballot != entry_ballot || !msg.ballot.is_owned_by(self.id)
        {
            return;
        }

        if let Some(entry) = self.log.get_mut(msg.slot) {
            entry.acks_mut().ack(msg.sender);
        }
        self.check_phase2(msg.slot);
    }

    /// Commit `slot` if its phase-2 acknowledgements reached quorum.
    pub(super) fn check_phase2(&mut self, slot: Slot) {
        let reached = match self.log.get(slot) {
            Some(entry) => !entry.is_committed() && self.quorums.phase2_reached(entry.acks()),
            None => false,
        };
        if reached {
            self.commit_slot(slot);
        }
    }

    /// Mark `slot` chosen, announce it and execute what became ready.
    fn commit_slot(&mut self, slot: Slot) {
        let Some(entry) = self.log.get_mut(slot) else {
            return;
        };
        entry.commit();
        let commit = Commit {
            ballot: entry.ballot(),
            slot,
            command: entry.command().clone(),
        };

        info!(
            replica = %self.id,
            ballot = %commit.ballot,
            slot = %slot,
            acks = entry.acks().len(),
            "committed"
        );
        self.env.broadcast(commit.into());
        self.execute_ready();
    }

    // =========================================================================
    // Acceptor and learner
    // =========================================================================

    /// Handle a phase-2 request.
    ///
    /// Votes if the ballot is at least the current one. Either way the reply
    /// carries this replica's current ballot, so a stale leader notices.
    pub fn on_accept(&mut self, msg: Accept) {
        let Some(proposer) = msg.ballot.owner() else {
            warn!(replica = %self.id, ballot = %msg.ballot, "accept without owner");
            return;
        };

        if msg.ballot >= self.ballot {
            if self.observe_ballot(msg.ballot) && self.has_outstanding_work() {
                self.schedule_backoff();
            }

            self.log.observe_slot(msg.slot);
            let displaced = match self.log.get_mut(msg.slot) {
                None => {
                    self.log
                        .insert(msg.slot, LogEntry::accepted(msg.ballot, msg.command));
                    None
                }
                Some(entry) if !entry.is_committed() && msg.ballot > entry.ballot() => {
                    entry.overwrite(msg.ballot, msg.command)
                }
                Some(_) => None,
            };
            if let Some(request) = displaced {
                self.retry_request(msg.slot, request);
            }

            debug!(
                replica = %self.id,
                ballot = %msg.ballot,
                slot = %msg.slot,
                "voted"
            );
        } else {
            debug!(
                replica = %self.id,
                ballot = %self.ballot,
                stale = %msg.ballot,
                slot = %msg.slot,
                "rejecting stale accept"
            );
        }

        self.env.send(
            proposer,
            Accepted {
                ballot: self.ballot,
                slot: msg.slot,
                sender: self.id,
            }
            .into(),
        );
    }

    /// Learn a chosen value.
    ///
    /// Does not touch the ballot or leadership: a commit states a fact about
    /// one slot, not a claim to lead.
    pub fn on_commit(&mut self, msg: Commit) {
        if msg.slot == Slot::SENTINEL {
            return;
        }
        self.log.observe_slot(msg.slot);

        let displaced = match self.log.get_mut(msg.slot) {
            None => {
                self.log
                    .insert(msg.slot, LogEntry::committed(msg.ballot, msg.command));
                None
            }
            Some(entry) if entry.is_committed() => {
                if entry.command() != &msg.command {
                    warn!(
                        replica = %self.id,
                        slot = %msg.slot,
                        ballot = %msg.ballot,
                        "conflicting commit for a chosen slot"
                    );
                }
                None
            }
            Some(entry) => {
                let displaced = entry.overwrite(msg.ballot, msg.command);
                entry.commit();
                displaced
            }
        };
        if let Some(request) = displaced {
            self.retry_request(msg.slot, request);
        }

        debug!(replica = %self.id, slot = %msg.slot, "learned commit");
        self.execute_ready();
    }
}
