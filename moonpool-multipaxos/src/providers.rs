//! Provider abstractions for time, tasks, and randomness.
//!
//! The replica core is sans-IO, but two things still reach outside it: the
//! randomized backoff delay, and (in the async driver) the timer task that
//! fires it. Routing both through providers lets the same code run on Tokio
//! in production and on a seeded RNG in deterministic tests.
//!
//! - [`TimeProvider`]: sleep and current time
//! - [`TaskProvider`]: spawning local tasks
//! - [`RandomProvider`]: random numbers
//! - [`Providers`]: the bundle, so downstream types carry one type parameter

use std::cell::RefCell;
use std::future::Future;
use std::ops::Range;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use rand::distr::uniform::SampleUniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Provider trait for time operations.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Time elapsed since the provider was created.
    fn now(&self) -> Duration;
}

/// Provider for spawning local tasks in a single-threaded context.
pub trait TaskProvider: Clone {
    /// Spawn a named task on the current thread.
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Provider trait for random number generation.
pub trait RandomProvider: Clone {
    /// A random value in `range` (exclusive upper bound, must not be empty).
    fn random_range<T>(&self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd;

    /// A random f64 in `[0, 1)`.
    fn random_ratio(&self) -> f64;

    /// `true` with the given probability.
    fn random_bool(&self, probability: f64) -> bool {
        self.random_ratio() < probability
    }
}

/// Bundle of the provider types for one runtime environment.
pub trait Providers: Clone + 'static {
    /// Time provider type.
    type Time: TimeProvider + 'static;

    /// Task provider type.
    type Task: TaskProvider + 'static;

    /// Random provider type.
    type Random: RandomProvider + 'static;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;

    /// Get the random provider instance.
    fn random(&self) -> &Self::Random;
}

// =============================================================================
// Tokio providers
// =============================================================================

/// Real time provider using Tokio's time facilities.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    start_time: tokio::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Task provider spawning onto the current `LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        trace!(task = name, "spawning local task");
        tokio::task::spawn_local(future)
    }
}

/// Production random provider using the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRandomProvider;

impl RandomProvider for TokioRandomProvider {
    fn random_range<T>(&self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        rand::rng().random_range(range)
    }

    fn random_ratio(&self) -> f64 {
        rand::rng().random()
    }
}

/// Production providers using the Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;
    type Random = TokioRandomProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}

// =============================================================================
// Deterministic randomness
// =============================================================================

/// Seeded random provider for reproducible runs.
///
/// Clones share one generator, so every consumer draws from the same
/// sequence and a seed fully determines a run.
#[derive(Debug, Clone)]
pub struct SeededRandomProvider {
    rng: Rc<RefCell<ChaCha8Rng>>,
}

impl SeededRandomProvider {
    /// Create a provider from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }
}

impl RandomProvider for SeededRandomProvider {
    fn random_range<T>(&self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        self.rng.borrow_mut().random_range(range)
    }

    fn random_ratio(&self) -> f64 {
        self.rng.borrow_mut().random()
    }
}
