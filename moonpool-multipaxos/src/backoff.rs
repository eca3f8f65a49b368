//! Randomized re-election backoff.
//!
//! A preempted replica with outstanding work retries leadership after
//! `bound + uniform(0..jitter)`. Competing candidates draw different delays,
//! so one of them usually finishes phase 1 before the others retry.
//!
//! At most one retry is outstanding per replica: [`BackoffScheduler::arm`]
//! refuses to arm twice until [`BackoffScheduler::fired`] runs.

use std::time::Duration;

use crate::providers::RandomProvider;

/// How long to wait before retrying an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    bound: Duration,
    jitter: Duration,
}

impl BackoffPolicy {
    /// Create a policy from its fixed and random parts.
    pub fn new(bound: Duration, jitter: Duration) -> Self {
        Self { bound, jitter }
    }

    /// Fixed part of the delay.
    pub fn bound(&self) -> Duration {
        self.bound
    }

    /// Exclusive upper bound of the random part.
    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Draw a delay.
    pub fn next_delay<R: RandomProvider>(&self, random: &R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.bound;
        }
        self.bound + Duration::from_millis(random.random_range(0..jitter_ms))
    }
}

/// Single-slot guard around the deferred election.
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    policy: BackoffPolicy,
    in_flight: bool,
}

impl BackoffScheduler {
    /// Create an idle scheduler.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            in_flight: false,
        }
    }

    /// Whether a deferred election is outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Arm the deferred election.
    ///
    /// Returns the delay to schedule, or `None` if one is already outstanding.
    pub fn arm<R: RandomProvider>(&mut self, random: &R) -> Option<Duration> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(self.policy.next_delay(random))
    }

    /// The deferred election ran; a new one may be armed.
    pub fn fired(&mut self) {
        self.in_flight = false;
    }
}
