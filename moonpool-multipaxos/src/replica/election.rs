//! Phase 1: leader election.
//!
//! A candidate bumps its ballot, broadcasts `Prepare(ballot, from)` and
//! collects promises. Each promise carries the responder's log from `from`
//! onward; the candidate merges them so that, once it holds a phase-1 quorum,
//! its log contains every value that may already have been chosen.
//!
//! ## Merge rules
//!
//! | Local entry | Reported entry | Outcome |
//! |---|---|---|
//! | absent | any | adopt as reported |
//! | committed | any | unchanged |
//! | accepted | committed | adopt and commit |
//! | accepted at `b` | accepted at `b' > b` | adopt |
//! | accepted at `b` | accepted at `b' <= b` | unchanged |
//!
//! When an adopted value replaces a different command this replica had
//! proposed for a client, the client's request is handed back for retry.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::Replica;
use crate::environment::{Environment, StateMachine};
use crate::log::LogEntry;
use crate::messages::{Accept, Prepare, Promise, PromisedEntry};
use crate::types::{Command, Slot};

impl<E: Environment, M: StateMachine> Replica<E, M> {
    // =========================================================================
    // Candidate
    // =========================================================================

    /// Start an election for a fresh ballot.
    ///
    /// Does nothing while this replica is the active leader.
    pub fn start_election(&mut self) {
        if self.active {
            return;
        }

        self.ballot = self.ballot.next(self.id);
        self.phase1_acks.reset();
        self.phase1_acks.ack(self.id);

        let from = self.log.execute_cursor();
        info!(
            replica = %self.id,
            ballot = %self.ballot,
            from = %from,
            "starting election"
        );
        self.env.broadcast(
            Prepare {
                ballot: self.ballot,
                from,
            }
            .into(),
        );

        if self.quorums.phase1_reached(&self.phase1_acks) {
            self.become_leader();
        }
    }

    /// Handle a promise from a peer.
    pub fn on_promise(&mut self, msg: Promise) {
        if self.active || msg.ballot < self.ballot {
            debug!(
                replica = %self.id,
                ballot = %self.ballot,
                promise_ballot = %msg.ballot,
                sender = %msg.sender,
                "ignoring promise"
            );
            return;
        }

        self.merge(msg.log);

        if self.observe_ballot(msg.ballot) {
            // The responder already promised a higher ballot.
            self.schedule_backoff();
        } else if msg.ballot.is_owned_by(self.id) {
            self.phase1_acks.ack(msg.sender);
            debug!(
                replica = %self.id,
                ballot = %self.ballot,
                sender = %msg.sender,
                promises = self.phase1_acks.len(),
                "promise received"
            );
            if self.quorums.phase1_reached(&self.phase1_acks) {
                self.become_leader();
            }
        }

        self.execute_ready();
    }

    /// Fold a promiser's log into the local one.
    fn merge(&mut self, reported: BTreeMap<Slot, PromisedEntry>) {
        for (slot, entry) in reported {
            if slot == Slot::SENTINEL {
                continue;
            }
            self.log.observe_slot(slot);

            let displaced = match self.log.get_mut(slot) {
                None => {
                    let adopted = if entry.committed {
                        LogEntry::committed(entry.ballot, entry.command)
                    } else {
                        LogEntry::accepted(entry.ballot, entry.command)
                    };
                    self.log.insert(slot, adopted);
                    None
                }
                Some(local) if local.is_committed() => None,
                Some(local) if entry.committed || entry.ballot > local.ballot() => {
                    let displaced = local.overwrite(entry.ballot, entry.command);
                    if entry.committed {
                        local.commit();
                    }
                    displaced
                }
                Some(_) => None,
            };

            if let Some(request) = displaced {
                self.retry_request(slot, request);
            }
        }
    }

    /// Take over the log after winning phase 1.
    ///
    /// Every unchosen slot between the cursor and the highest known slot is
    /// re-proposed under the new ballot, with gaps filled by no-ops, before
    /// queued client requests get fresh slots.
    fn become_leader(&mut self) {
        self.active = true;
        info!(
            replica = %self.id,
            ballot = %self.ballot,
            promises = self.phase1_acks.len(),
            cursor = %self.log.execute_cursor(),
            highest = %self.log.highest_slot(),
            pending = self.pending.len(),
            "became leader"
        );

        let id = self.id;
        let ballot = self.ballot;
        let now = self.env.now();
        let highest = self.log.highest_slot();
        let mut slot = self.log.execute_cursor();

        while slot <= highest {
            let command = match self.log.get_mut(slot) {
                Some(entry) if entry.is_committed() => None,
                Some(entry) => {
                    entry.repropose(ballot, now);
                    entry.acks_mut().ack(id);
                    Some(entry.command().clone())
                }
                None => {
                    let entry = self
                        .log
                        .insert(slot, LogEntry::proposal(ballot, Command::Noop, None, now));
                    entry.acks_mut().ack(id);
                    Some(Command::Noop)
                }
            };

            if let Some(command) = command {
                debug!(replica = %id, ballot = %ballot, slot = %slot, "re-proposing slot");
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
            slot = slot.next();
        }

        for request in std::mem::take(&mut self.pending) {
            self.propose(request);
        }

        self.execute_ready();
    }

    // =========================================================================
    // Acceptor
    // =========================================================================

    /// Handle a prepare from a candidate.
    ///
    /// Always answers with this replica's current ballot and its log from the
    /// candidate's `from` slot; a candidate holding a lower ballot learns it
    /// was superseded.
    pub fn on_prepare(&mut self, msg: Prepare) {
        let Some(candidate) = msg.ballot.owner() else {
            warn!(replica = %self.id, ballot = %msg.ballot, "prepare without owner");
            return;
        };

        if self.observe_ballot(msg.ballot) {
            debug!(
                replica = %self.id,
                ballot = %self.ballot,
                candidate = %candidate,
                "promised candidate"
            );
            if self.has_outstanding_work() {
                self.schedule_backoff();
            }
        }

        let promise = Promise {
            ballot: self.ballot,
            sender: self.id,
            log: self.log.promised_entries(msg.from),
        };
        self.env.send(candidate, promise.into());
    }
}
