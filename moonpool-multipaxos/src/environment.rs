//! Collaborators the replica core talks to.
//!
//! The core is sans-IO: it never opens sockets, spawns tasks or sleeps.
//! Everything that leaves the replica goes through an [`Environment`], and
//! command execution goes through a [`StateMachine`].
//!
//! Implementations:
//! - the async driver's environment in [`crate::driver`]
//! - recording environments in tests, which capture outbound messages and
//!   backoff requests so scenarios can be replayed step by step

use std::time::Duration;

use crate::messages::Message;
use crate::providers::RandomProvider;
use crate::request::ClientRequest;
use crate::types::ReplicaId;

/// Outbound side of a replica.
///
/// All sends are fire-and-forget; delivery is not assumed.
pub trait Environment {
    /// Random provider used for backoff jitter.
    type Random: RandomProvider;

    /// This replica's identity.
    fn id(&self) -> ReplicaId;

    /// Number of replicas in the cluster, this one included.
    fn cluster_size(&self) -> usize;

    /// Send `message` to every peer except this replica.
    fn broadcast(&mut self, message: Message);

    /// Send `message` to one peer.
    fn send(&mut self, to: ReplicaId, message: Message);

    /// Re-submit a request whose slot was taken by another command.
    fn retry(&mut self, request: ClientRequest);

    /// Arrange for [`crate::Replica::on_backoff_elapsed`] to run after `delay`.
    fn schedule_election(&mut self, delay: Duration);

    /// Random provider instance.
    fn random(&self) -> &Self::Random;

    /// Current time, for diagnostics.
    fn now(&self) -> Duration;
}

/// The replicated state machine.
pub trait StateMachine {
    /// Apply a committed command and return its result.
    fn execute(&mut self, command: &[u8]) -> Vec<u8>;
}
