//! Replica configuration.
//!
//! Loading configuration files is up to the embedding process; this module
//! only defines the parameters the replica consumes and their defaults.
//!
//! | Field | Default | Meaning |
//! |---|---|---|
//! | `backoff_bound_ms` | 100 | Fixed part of the re-election delay |
//! | `backoff_jitter_ms` | 100 | Upper bound (exclusive) of the random part |
//! | `phase1_quorum` | majority | Promises needed to lead |
//! | `phase2_quorum` | majority | Accepts needed to commit |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::quorum::QuorumSpec;
use crate::types::PaxosError;

/// Parameters of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Fixed part of the randomized re-election delay, in milliseconds.
    pub backoff_bound_ms: u64,

    /// Random part of the re-election delay is drawn from `0..backoff_jitter_ms`.
    pub backoff_jitter_ms: u64,

    /// Phase-1 quorum size. `None` means a majority.
    pub phase1_quorum: Option<usize>,

    /// Phase-2 quorum size. `None` means a majority.
    pub phase2_quorum: Option<usize>,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            backoff_bound_ms: 100,
            backoff_jitter_ms: 100,
            phase1_quorum: None,
            phase2_quorum: None,
        }
    }
}

impl ReplicaConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, PaxosError> {
        serde_json::from_str(json).map_err(|e| PaxosError::InvalidConfig(e.to_string()))
    }

    /// The re-election backoff policy.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_bound_ms),
            Duration::from_millis(self.backoff_jitter_ms),
        )
    }

    /// Quorum thresholds for a cluster of `cluster_size` replicas.
    ///
    /// A single explicit size is paired with a majority for the other phase.
    pub fn quorums(&self, cluster_size: usize) -> Result<QuorumSpec, PaxosError> {
        match (self.phase1_quorum, self.phase2_quorum) {
            (None, None) => QuorumSpec::majority(cluster_size),
            (phase1, phase2) => {
                let majority = cluster_size / 2 + 1;
                QuorumSpec::flexible(
                    cluster_size,
                    phase1.unwrap_or(majority),
                    phase2.unwrap_or(majority),
                )
            }
        }
    }

    /// Check the configuration against a cluster size.
    pub fn validate(&self, cluster_size: usize) -> Result<(), PaxosError> {
        self.quorums(cluster_size).map(|_| ())
    }
}
