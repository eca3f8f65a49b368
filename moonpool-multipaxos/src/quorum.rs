//! Quorum tracking for phase 1 and phase 2.
//!
//! A [`Quorum`] is the set of replicas that acknowledged one round: the
//! phase-1 round of an election, or the phase-2 round of a single slot.
//! [`QuorumSpec`] holds the thresholds those sets are measured against.
//!
//! ## Thresholds
//!
//! In the standard configuration both thresholds are a majority
//! (`n / 2 + 1`). Flexible Paxos only needs every phase-1 quorum to intersect
//! every phase-2 quorum, i.e. `q1 + q2 > n`, which [`QuorumSpec::flexible`]
//! enforces.

use std::collections::HashSet;

use crate::types::{PaxosError, ReplicaId};

/// Acknowledgements collected for one round.
#[derive(Debug, Clone, Default)]
pub struct Quorum {
    acks: HashSet<ReplicaId>,
}

impl Quorum {
    /// Create an empty quorum tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every acknowledgement.
    pub fn reset(&mut self) {
        self.acks.clear();
    }

    /// Record an acknowledgement from `id`.
    ///
    /// Returns `false` if `id` had already acknowledged this round.
    pub fn ack(&mut self, id: ReplicaId) -> bool {
        self.acks.insert(id)
    }

    /// Whether `id` acknowledged this round.
    pub fn contains(&self, id: ReplicaId) -> bool {
        self.acks.contains(&id)
    }

    /// Number of distinct acknowledgements.
    pub fn len(&self) -> usize {
        self.acks.len()
    }

    /// Whether no replica has acknowledged yet.
    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }

    /// Whether `quorum_size` out of `n` replicas have acknowledged.
    pub fn threshold_reached(&self, n: usize, quorum_size: usize) -> bool {
        debug_assert!(quorum_size <= n, "quorum larger than the cluster");
        self.acks.len() >= quorum_size
    }
}

/// Quorum thresholds for a cluster of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumSpec {
    cluster_size: usize,
    phase1: usize,
    phase2: usize,
}

impl QuorumSpec {
    /// Majority thresholds for both phases.
    pub fn majority(cluster_size: usize) -> Result<Self, PaxosError> {
        if cluster_size == 0 {
            return Err(PaxosError::InvalidConfig(
                "cluster must have at least one replica".to_string(),
            ));
        }
        let majority = cluster_size / 2 + 1;
        Ok(Self {
            cluster_size,
            phase1: majority,
            phase2: majority,
        })
    }

    /// Explicit thresholds, valid only if every phase-1 quorum intersects
    /// every phase-2 quorum.
    pub fn flexible(cluster_size: usize, phase1: usize, phase2: usize) -> Result<Self, PaxosError> {
        if cluster_size == 0 {
            return Err(PaxosError::InvalidConfig(
                "cluster must have at least one replica".to_string(),
            ));
        }
        for (name, size) in [("phase1_quorum", phase1), ("phase2_quorum", phase2)] {
            if size == 0 || size > cluster_size {
                return Err(PaxosError::InvalidConfig(format!(
                    "{name} must be in 1..={cluster_size}, got {size}"
                )));
            }
        }
        if phase1 + phase2 <= cluster_size {
            return Err(PaxosError::QuorumOverlap {
                phase1,
                phase2,
                cluster_size,
            });
        }
        Ok(Self {
            cluster_size,
            phase1,
            phase2,
        })
    }

    /// Number of replicas in the cluster.
    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    /// Phase-1 (promise) threshold.
    pub fn phase1(&self) -> usize {
        self.phase1
    }

    /// Phase-2 (accept) threshold.
    pub fn phase2(&self) -> usize {
        self.phase2
    }

    /// Whether `quorum` holds enough promises to lead.
    pub fn phase1_reached(&self, quorum: &Quorum) -> bool {
        quorum.threshold_reached(self.cluster_size, self.phase1)
    }

    /// Whether `quorum` holds enough accepts to commit.
    pub fn phase2_reached(&self, quorum: &Quorum) -> bool {
        quorum.threshold_reached(self.cluster_size, self.phase2)
    }
}
