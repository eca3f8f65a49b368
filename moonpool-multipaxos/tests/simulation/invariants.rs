//! Invariant checkers for multi-Paxos simulation tests.
//!
//! ## Safety Properties
//!
//! Checked after every simulation event. These must NEVER be violated,
//! regardless of message loss, duplication or reordering:
//!
//! 1. **Agreement**: no two replicas commit different commands for a slot.
//!    In Raft terms: no two different entries committed at the same index.
//!
//! 2. **Stable choice**: once a slot is committed anywhere, its command never
//!    changes afterwards.
//!
//! 3. **Ballot monotonicity**: a replica's ballot never decreases.
//!
//! 4. **Leader ownership**: an active leader owns its current ballot, so at
//!    most one leader exists per ballot.
//!
//! 5. **Execution prefix**: the execution cursor never moves backwards and
//!    every slot below it is committed.
//!
//! ## End-of-run Properties
//!
//! - State machines applied compatible sequences (one is a prefix of the
//!   other).

use std::collections::BTreeMap;

use moonpool_multipaxos::{Ballot, Command, ReplicaId, Slot, SlotState};

use super::cluster::SimReplica;

// ============================================================================
// Safety Invariant Checker
// ============================================================================

/// Remembers what every replica has shown so far and panics on regressions.
pub struct InvariantChecker {
    chosen: BTreeMap<Slot, Command>,
    ballots: Vec<Ballot>,
    cursors: Vec<Slot>,
    leaders: BTreeMap<Ballot, ReplicaId>,
    checks: u64,
}

impl InvariantChecker {
    /// A checker for `size` replicas.
    pub fn new(size: usize) -> Self {
        Self {
            chosen: BTreeMap::new(),
            ballots: vec![Ballot::ZERO; size],
            cursors: vec![Slot::FIRST; size],
            leaders: BTreeMap::new(),
            checks: 0,
        }
    }

    /// Every value chosen so far, by slot.
    pub fn chosen(&self) -> &BTreeMap<Slot, Command> {
        &self.chosen
    }

    /// Number of times the checker ran.
    pub fn checks(&self) -> u64 {
        self.checks
    }

    /// Check every safety property against the current replica states.
    pub fn check(&mut self, replicas: &[SimReplica]) {
        self.checks += 1;
        for (index, replica) in replicas.iter().enumerate() {
            self.check_ballot(index, replica);
            self.check_leader(replica);
            self.check_cursor(index, replica);
            self.check_agreement(replica);
        }
    }

    fn check_ballot(&mut self, index: usize, replica: &SimReplica) {
        let ballot = replica.ballot();
        assert!(
            ballot >= self.ballots[index],
            "SAFETY VIOLATION: {} ballot went from {} to {}",
            replica.id(),
            self.ballots[index],
            ballot
        );
        self.ballots[index] = ballot;
    }

    fn check_leader(&mut self, replica: &SimReplica) {
        if !replica.is_leader() {
            return;
        }
        let ballot = replica.ballot();
        assert!(
            ballot.is_owned_by(replica.id()),
            "SAFETY VIOLATION: {} leads under {} which it does not own",
            replica.id(),
            ballot
        );
        let leader = *self.leaders.entry(ballot).or_insert(replica.id());
        assert_eq!(
            leader,
            replica.id(),
            "SAFETY VIOLATION: two leaders for {ballot}"
        );
    }

    fn check_cursor(&mut self, index: usize, replica: &SimReplica) {
        let cursor = replica.log().execute_cursor();
        let previous = self.cursors[index];
        assert!(
            cursor >= previous,
            "SAFETY VIOLATION: {} cursor went from {} to {}",
            replica.id(),
            previous,
            cursor
        );
        let mut slot = previous;
        while slot < cursor {
            assert!(
                matches!(replica.log().state(slot), SlotState::Committed(_)),
                "SAFETY VIOLATION: {} executed past uncommitted {}",
                replica.id(),
                slot
            );
            slot = slot.next();
        }
        self.cursors[index] = cursor;
    }

    fn check_agreement(&mut self, replica: &SimReplica) {
        for (slot, entry) in replica.log().committed() {
            match self.chosen.get(&slot) {
                Some(chosen) => assert_eq!(
                    chosen,
                    entry.command(),
                    "SAFETY VIOLATION: {} committed a different command at {}",
                    replica.id(),
                    slot
                ),
                None => {
                    self.chosen.insert(slot, entry.command().clone());
                }
            }
        }
    }
}

// ============================================================================
// End-of-run checks
// ============================================================================

/// Every pair of state machines applied compatible sequences.
pub fn assert_prefix_consistent(replicas: &[SimReplica]) {
    let longest = replicas
        .iter()
        .map(|r| &r.machine().applied)
        .max_by_key(|applied| applied.len())
        .expect("at least one replica");
    for replica in replicas {
        let applied = &replica.machine().applied;
        assert_eq!(
            applied.as_slice(),
            &longest[..applied.len()],
            "SAFETY VIOLATION: {} applied a divergent sequence",
            replica.id()
        );
    }
}

/// Every state machine applied exactly the same sequence.
pub fn assert_fully_replicated(replicas: &[SimReplica]) {
    let first = &replicas[0].machine().applied;
    for replica in &replicas[1..] {
        assert_eq!(
            &replica.machine().applied,
            first,
            "{} did not catch up with {}",
            replica.id(),
            replicas[0].id()
        );
    }
}
