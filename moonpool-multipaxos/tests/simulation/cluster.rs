//! Discrete-event cluster simulator.
//!
//! Replicas never see real time or sockets. Their [`SimEnv`] records what
//! they want to send or schedule, and [`SimCluster`] turns those records into
//! timestamped events on a single priority queue. Events with the same
//! timestamp run in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use moonpool_multipaxos::{
    ClientRequest, CommandReply, Environment, Message, RandomProvider, Replica, ReplicaConfig,
    ReplicaId, SeededRandomProvider, StateMachine,
};

use super::invariants::InvariantChecker;

// ============================================================================
// Replica environment
// ============================================================================

/// Environment that records outbound effects for the simulator to apply.
pub struct SimEnv {
    id: ReplicaId,
    cluster_size: usize,
    now: Duration,
    outbox: Vec<(Option<ReplicaId>, Message)>,
    retried: Vec<ClientRequest>,
    elections: Vec<Duration>,
    random: SeededRandomProvider,
}

impl Environment for SimEnv {
    type Random = SeededRandomProvider;

    fn id(&self) -> ReplicaId {
        self.id
    }

    fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    fn broadcast(&mut self, message: Message) {
        self.outbox.push((None, message));
    }

    fn send(&mut self, to: ReplicaId, message: Message) {
        self.outbox.push((Some(to), message));
    }

    fn retry(&mut self, request: ClientRequest) {
        self.retried.push(request);
    }

    fn schedule_election(&mut self, delay: Duration) {
        self.elections.push(delay);
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }

    fn now(&self) -> Duration {
        self.now
    }
}

/// State machine that journals every command it applies.
#[derive(Debug, Default)]
pub struct Journal {
    /// Applied commands, in execution order.
    pub applied: Vec<Vec<u8>>,
}

impl StateMachine for Journal {
    fn execute(&mut self, command: &[u8]) -> Vec<u8> {
        self.applied.push(command.to_vec());
        format!("ok:{}", self.applied.len()).into_bytes()
    }
}

/// A replica wired to the simulator.
pub type SimReplica = Replica<SimEnv, Journal>;

// ============================================================================
// Network model
// ============================================================================

/// Latency and fault probabilities applied to every message.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Minimum one-way latency in milliseconds.
    pub min_latency_ms: u64,
    /// Maximum one-way latency in milliseconds (exclusive).
    pub max_latency_ms: u64,
    /// Probability that a message is lost.
    pub drop_probability: f64,
    /// Probability that a delivered message is delivered twice.
    pub duplicate_probability: f64,
}

impl NetworkConfig {
    /// Reordering but no loss.
    pub fn lossless() -> Self {
        Self {
            min_latency_ms: 1,
            max_latency_ms: 10,
            drop_probability: 0.0,
            duplicate_probability: 0.0,
        }
    }

    /// Loss, duplication and wide latency spread.
    pub fn chaotic() -> Self {
        Self {
            min_latency_ms: 1,
            max_latency_ms: 40,
            drop_probability: 0.05,
            duplicate_probability: 0.05,
        }
    }
}

// ============================================================================
// Event queue
// ============================================================================

#[derive(Debug)]
enum SimEvent {
    Deliver { to: ReplicaId, message: Message },
    Backoff { replica: ReplicaId },
    Submit { replica: ReplicaId, request: ClientRequest },
    Isolate { replica: ReplicaId, duration_ms: u64 },
    Heal { replica: ReplicaId },
}

struct Scheduled {
    at_ms: u64,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.at_ms, self.seq) == (other.at_ms, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // BinaryHeap is a max-heap: earliest (time, seq) must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at_ms, other.seq).cmp(&(self.at_ms, self.seq))
    }
}

/// Outcome of [`SimCluster::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReport {
    /// Events processed.
    pub events: u64,
    /// Simulated time when the run stopped.
    pub final_time_ms: u64,
    /// Whether the event queue drained before the event cap.
    pub quiescent: bool,
    /// Messages lost by the network model.
    pub dropped: u64,
}

// ============================================================================
// Cluster
// ============================================================================

/// A cluster of replicas on a simulated network.
pub struct SimCluster {
    replicas: Vec<SimReplica>,
    network: NetworkConfig,
    random: SeededRandomProvider,
    queue: BinaryHeap<Scheduled>,
    seq: u64,
    now_ms: u64,
    isolated: HashSet<ReplicaId>,
    receivers: Vec<(Vec<u8>, oneshot::Receiver<CommandReply>)>,
    checker: InvariantChecker,
    dropped: u64,
}

impl SimCluster {
    /// Build a cluster of `size` replicas, identities `1..=size`.
    pub fn new(size: usize, seed: u64, network: NetworkConfig, config: &ReplicaConfig) -> Self {
        let random = SeededRandomProvider::new(seed);
        let replicas = (1..=size as u64)
            .map(|id| {
                let env = SimEnv {
                    id: ReplicaId(id),
                    cluster_size: size,
                    now: Duration::ZERO,
                    outbox: Vec::new(),
                    retried: Vec::new(),
                    elections: Vec::new(),
                    random: random.clone(),
                };
                Replica::new(env, Journal::default(), config).expect("valid replica config")
            })
            .collect();

        Self {
            replicas,
            network,
            random,
            queue: BinaryHeap::new(),
            seq: 0,
            now_ms: 0,
            isolated: HashSet::new(),
            receivers: Vec::new(),
            checker: InvariantChecker::new(size),
            dropped: 0,
        }
    }

    /// The replicas, in identity order.
    pub fn replicas(&self) -> &[SimReplica] {
        &self.replicas
    }

    /// Replica `id`.
    pub fn replica(&self, id: u64) -> &SimReplica {
        &self.replicas[(id - 1) as usize]
    }

    /// Simulated time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// The invariant checker, for end-of-run checks.
    pub fn checker(&self) -> &InvariantChecker {
        &self.checker
    }

    /// Submit `command` to replica `replica` at time `at_ms`.
    pub fn submit_at(&mut self, at_ms: u64, replica: u64, command: Vec<u8>) {
        let (request, rx) = ClientRequest::new(command.clone());
        self.receivers.push((command, rx));
        self.schedule(
            at_ms,
            SimEvent::Submit {
                replica: ReplicaId(replica),
                request,
            },
        );
    }

    /// Cut replica `replica` off the network from `at_ms` for `duration_ms`.
    pub fn isolate_at(&mut self, at_ms: u64, replica: u64, duration_ms: u64) {
        self.schedule(
            at_ms,
            SimEvent::Isolate {
                replica: ReplicaId(replica),
                duration_ms,
            },
        );
    }

    /// Process events until the queue drains or `max_events` ran.
    ///
    /// Invariants are checked after every event.
    pub fn run(&mut self, max_events: u64) -> SimReport {
        let mut events = 0;
        while events < max_events {
            let Some(next) = self.queue.pop() else {
                break;
            };
            self.now_ms = next.at_ms;
            self.dispatch(next.event);
            events += 1;
            self.checker.check(&self.replicas);
        }

        let report = SimReport {
            events,
            final_time_ms: self.now_ms,
            quiescent: self.queue.is_empty(),
            dropped: self.dropped,
        };
        debug!(?report, "simulation finished");
        report
    }

    /// Replies received so far, and the commands still unanswered.
    pub fn collect_replies(&mut self) -> (Vec<CommandReply>, Vec<Vec<u8>>) {
        let mut replies = Vec::new();
        let mut unanswered = Vec::new();
        for (command, rx) in &mut self.receivers {
            match rx.try_recv() {
                Ok(reply) => replies.push(reply),
                Err(_) => unanswered.push(command.clone()),
            }
        }
        (replies, unanswered)
    }

    fn schedule(&mut self, at_ms: u64, event: SimEvent) {
        self.seq += 1;
        self.queue.push(Scheduled {
            at_ms,
            seq: self.seq,
            event,
        });
    }

    fn index(id: ReplicaId) -> usize {
        (id.0 - 1) as usize
    }

    fn dispatch(&mut self, event: SimEvent) {
        match event {
            SimEvent::Deliver { to, message } => {
                if self.isolated.contains(&to) {
                    self.dropped += 1;
                    return;
                }
                trace!(at = self.now_ms, to = %to, kind = message.kind(), "deliver");
                self.with_replica(to, |r| r.handle_message(message));
            }
            SimEvent::Backoff { replica } => {
                self.with_replica(replica, |r| r.on_backoff_elapsed());
            }
            SimEvent::Submit { replica, request } => {
                self.with_replica(replica, |r| r.on_client_request(request));
            }
            SimEvent::Isolate {
                replica,
                duration_ms,
            } => {
                debug!(at = self.now_ms, replica = %replica, duration_ms, "isolating");
                self.isolated.insert(replica);
                self.schedule(self.now_ms + duration_ms, SimEvent::Heal { replica });
            }
            SimEvent::Heal { replica } => {
                debug!(at = self.now_ms, replica = %replica, "healing");
                self.isolated.remove(&replica);
            }
        }
    }

    /// Run one handler on a replica, then apply its recorded effects.
    fn with_replica(&mut self, id: ReplicaId, handler: impl FnOnce(&mut SimReplica)) {
        let index = Self::index(id);
        let now = Duration::from_millis(self.now_ms);
        let replica = &mut self.replicas[index];
        replica.env_mut().now = now;
        handler(replica);

        let env = replica.env_mut();
        let outbox = std::mem::take(&mut env.outbox);
        let retried = std::mem::take(&mut env.retried);
        let elections = std::mem::take(&mut env.elections);

        for (to, message) in outbox {
            match to {
                Some(to) => self.transmit(id, to, message),
                None => {
                    for peer in 1..=self.replicas.len() as u64 {
                        let peer = ReplicaId(peer);
                        if peer != id {
                            self.transmit(id, peer, message.clone());
                        }
                    }
                }
            }
        }
        for request in retried {
            self.schedule(self.now_ms, SimEvent::Submit { replica: id, request });
        }
        for delay in elections {
            let at = self.now_ms + delay.as_millis() as u64;
            self.schedule(at, SimEvent::Backoff { replica: id });
        }
    }

    fn transmit(&mut self, from: ReplicaId, to: ReplicaId, message: Message) {
        if self.isolated.contains(&from) || self.random.random_bool(self.network.drop_probability)
        {
            self.dropped += 1;
            return;
        }
        if self.random.random_bool(self.network.duplicate_probability) {
            let at = self.now_ms + self.latency();
            self.schedule(
                at,
                SimEvent::Deliver {
                    to,
                    message: message.clone(),
                },
            );
        }
        let at = self.now_ms + self.latency();
        self.schedule(at, SimEvent::Deliver { to, message });
    }

    fn latency(&self) -> u64 {
        self.random
            .random_range(self.network.min_latency_ms..self.network.max_latency_ms)
    }
}
