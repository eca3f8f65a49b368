//! Client workloads for multi-Paxos simulation testing.
//!
//! A workload decides which replica receives which command and when. Every
//! command is unique (`"<tag>-<n>"`), so a reply can be matched to the
//! submission that produced it.

use moonpool_multipaxos::{RandomProvider, SeededRandomProvider};

use super::cluster::SimCluster;

/// Number of commands a workload submits unless told otherwise.
pub const DEFAULT_NUM_COMMANDS: u64 = 20;

/// How submissions are spread over replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targeting {
    /// Always the same replica.
    Fixed(u64),
    /// A uniformly random replica per command.
    Random,
    /// Every replica, one after the other.
    RoundRobin,
}

/// A batch of client submissions.
#[derive(Debug, Clone)]
pub struct ClientWorkload {
    /// Prefix of every command.
    pub tag: &'static str,
    /// Number of commands.
    pub commands: u64,
    /// Time of the first submission.
    pub start_ms: u64,
    /// Upper bound (exclusive) of the gap between submissions.
    pub max_gap_ms: u64,
    /// Which replica receives each command.
    pub targeting: Targeting,
}

impl ClientWorkload {
    /// `commands` submissions to random replicas, a few milliseconds apart.
    pub fn random(tag: &'static str, commands: u64) -> Self {
        Self {
            tag,
            commands,
            start_ms: 0,
            max_gap_ms: 20,
            targeting: Targeting::Random,
        }
    }

    /// Schedule the submissions on `cluster`.
    ///
    /// Returns the submitted commands in submission order.
    pub fn install(&self, cluster: &mut SimCluster, random: &SeededRandomProvider) -> Vec<Vec<u8>> {
        let size = cluster.replicas().len() as u64;
        let mut at = self.start_ms;
        let mut submitted = Vec::new();

        for n in 0..self.commands {
            let replica = match self.targeting {
                Targeting::Fixed(id) => id,
                Targeting::Random => random.random_range(1..size + 1),
                Targeting::RoundRobin => n % size + 1,
            };
            let command = format!("{}-{}", self.tag, n).into_bytes();
            cluster.submit_at(at, replica, command.clone());
            submitted.push(command);
            if self.max_gap_ms > 0 {
                at += random.random_range(0..self.max_gap_ms);
            }
        }
        submitted
    }
}
