//! Async driver: runs a replica as a single-task actor.
//!
//! The replica core is synchronous and single-writer. The driver gives it an
//! inbox: peer messages, client requests and backoff expiries are queued on
//! one unbounded channel and handled one at a time by [`ReplicaDriver::run`],
//! so no two handlers ever overlap.
//!
//! ```text
//!  Transport ──Message──┐
//!  ReplicaHandle ─Client┼──> inbox ──> ReplicaDriver::run ──> Replica
//!  backoff timer ───────┘                                      │
//!        ^                                                     │
//!        └────── DriverEnvironment::schedule_election <────────┘
//! ```
//!
//! Timers are local tasks spawned through the [`TaskProvider`], so the
//! driver must run inside a `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::codec::{JsonCodec, MessageCodec};
use crate::config::ReplicaConfig;
use crate::environment::{Environment, StateMachine};
use crate::messages::Message;
use crate::providers::{Providers, TaskProvider, TimeProvider};
use crate::replica::{Replica, ReplicaStatus};
use crate::request::{ClientRequest, CommandReply};
use crate::types::{PaxosError, ReplicaId};

/// Outbound message delivery between replicas.
///
/// Delivery is best effort: a transport may drop, delay or duplicate.
pub trait Transport {
    /// Deliver `message` to replica `to`.
    fn send(&self, to: ReplicaId, message: Message);
}

/// One input to the replica actor.
#[derive(Debug)]
pub enum ReplicaEvent {
    /// A message from a peer.
    Message(Message),
    /// A client command, fresh or re-submitted.
    Client(ClientRequest),
    /// The deferred election is due.
    BackoffElapsed,
    /// Snapshot request.
    Status(oneshot::Sender<ReplicaStatus>),
    /// Stop the actor loop.
    Shutdown,
}

// =============================================================================
// Environment
// =============================================================================

/// [`Environment`] backed by a [`Transport`] and the driver's inbox.
pub struct DriverEnvironment<P: Providers, T: Transport> {
    id: ReplicaId,
    members: Vec<ReplicaId>,
    transport: T,
    providers: P,
    events: mpsc::UnboundedSender<ReplicaEvent>,
}

impl<P: Providers, T: Transport> DriverEnvironment<P, T> {
    /// Every replica of the cluster, this one included.
    pub fn members(&self) -> &[ReplicaId] {
        &self.members
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<P: Providers, T: Transport> Environment for DriverEnvironment<P, T> {
    type Random = P::Random;

    fn id(&self) -> ReplicaId {
        self.id
    }

    fn cluster_size(&self) -> usize {
        self.members.len()
    }

    fn broadcast(&mut self, message: Message) {
        for to in self.members.iter().filter(|to| **to != self.id) {
            self.transport.send(*to, message.clone());
        }
    }

    fn send(&mut self, to: ReplicaId, message: Message) {
        self.transport.send(to, message);
    }

    fn retry(&mut self, request: ClientRequest) {
        if self.events.send(ReplicaEvent::Client(request)).is_err() {
            debug!(replica = %self.id, "driver stopped, dropping retried request");
        }
    }

    fn schedule_election(&mut self, delay: Duration) {
        let time = self.providers.time().clone();
        let events = self.events.clone();
        self.providers
            .task()
            .spawn_task("election_backoff", async move {
                time.sleep(delay).await;
                if events.send(ReplicaEvent::BackoffElapsed).is_err() {
                    trace!("driver stopped before backoff fired");
                }
            });
    }

    fn random(&self) -> &Self::Random {
        self.providers.random()
    }

    fn now(&self) -> Duration {
        self.providers.time().now()
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Owns a replica and feeds it events from its inbox.
pub struct ReplicaDriver<P: Providers, T: Transport, M: StateMachine> {
    replica: Replica<DriverEnvironment<P, T>, M>,
    inbox: mpsc::UnboundedReceiver<ReplicaEvent>,
    handle: ReplicaHandle,
}

impl<P: Providers, T: Transport, M: StateMachine> ReplicaDriver<P, T, M> {
    /// Create a driver for replica `id` of the cluster `members`.
    pub fn new(
        providers: P,
        transport: T,
        machine: M,
        id: ReplicaId,
        mut members: Vec<ReplicaId>,
        config: &ReplicaConfig,
    ) -> Result<Self, PaxosError> {
        members.sort();
        members.dedup();
        if !members.contains(&id) {
            return Err(PaxosError::InvalidConfig(format!(
                "{id} is not a member of the cluster"
            )));
        }

        let (events, inbox) = mpsc::unbounded_channel();
        let env = DriverEnvironment {
            id,
            members,
            transport,
            providers,
            events: events.clone(),
        };
        let replica = Replica::new(env, machine, config)?;

        Ok(Self {
            replica,
            inbox,
            handle: ReplicaHandle { id, events },
        })
    }

    /// A handle for delivering events to this driver.
    pub fn handle(&self) -> ReplicaHandle {
        self.handle.clone()
    }

    /// The replica being driven.
    pub fn replica(&self) -> &Replica<DriverEnvironment<P, T>, M> {
        &self.replica
    }

    /// Handle events until [`ReplicaHandle::shutdown`], then return the
    /// replica.
    pub async fn run(mut self) -> Replica<DriverEnvironment<P, T>, M> {
        let id = self.replica.id();
        info!(replica = %id, "replica driver started");

        while let Some(event) = self.inbox.recv().await {
            match event {
                ReplicaEvent::Message(message) => {
                    trace!(replica = %id, kind = message.kind(), ballot = %message.ballot(), "message");
                    self.replica.handle_message(message);
                }
                ReplicaEvent::Client(request) => self.replica.on_client_request(request),
                ReplicaEvent::BackoffElapsed => self.replica.on_backoff_elapsed(),
                ReplicaEvent::Status(reply) => {
                    let _ = reply.send(self.replica.status());
                }
                ReplicaEvent::Shutdown => break,
            }
        }

        info!(replica = %id, "replica driver stopped");
        self.replica
    }
}

/// Cloneable sender side of a driver's inbox.
#[derive(Debug, Clone)]
pub struct ReplicaHandle {
    id: ReplicaId,
    events: mpsc::UnboundedSender<ReplicaEvent>,
}

impl ReplicaHandle {
    /// The replica behind this handle.
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Queue a peer message.
    pub fn deliver(&self, message: Message) -> Result<(), PaxosError> {
        self.events
            .send(ReplicaEvent::Message(message))
            .map_err(|_| PaxosError::Shutdown)
    }

    /// Submit a command and wait until it executed.
    pub async fn submit(&self, command: Vec<u8>) -> Result<CommandReply, PaxosError> {
        let (request, reply) = ClientRequest::new(command);
        self.events
            .send(ReplicaEvent::Client(request))
            .map_err(|_| PaxosError::Shutdown)?;
        reply.await.map_err(|_| PaxosError::ReplyDropped)
    }

    /// Snapshot of the replica's state.
    pub async fn status(&self) -> Result<ReplicaStatus, PaxosError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(ReplicaEvent::Status(tx))
            .map_err(|_| PaxosError::Shutdown)?;
        rx.await.map_err(|_| PaxosError::Shutdown)
    }

    /// Ask the driver to stop after the events already queued.
    pub fn shutdown(&self) -> Result<(), PaxosError> {
        self.events
            .send(ReplicaEvent::Shutdown)
            .map_err(|_| PaxosError::Shutdown)
    }
}

// =============================================================================
// In-process transport
// =============================================================================

/// Transport between drivers in the same thread.
///
/// Messages go through the codec on every hop, so the wire format is
/// exercised even without sockets. Replicas that are not registered (or were
/// disconnected) silently lose their messages.
#[derive(Clone)]
pub struct LocalTransport<C: MessageCodec = JsonCodec> {
    routes: Rc<RefCell<HashMap<ReplicaId, ReplicaHandle>>>,
    codec: C,
}

impl<C: MessageCodec> LocalTransport<C> {
    /// Create an empty routing table.
    pub fn new(codec: C) -> Self {
        Self {
            routes: Rc::new(RefCell::new(HashMap::new())),
            codec,
        }
    }

    /// Route messages for `handle.id()` to `handle`.
    pub fn register(&self, handle: ReplicaHandle) {
        self.routes.borrow_mut().insert(handle.id(), handle);
    }

    /// Stop delivering messages to `id`.
    pub fn disconnect(&self, id: ReplicaId) {
        self.routes.borrow_mut().remove(&id);
    }
}

impl<C: MessageCodec> Transport for LocalTransport<C> {
    fn send(&self, to: ReplicaId, message: Message) {
        let decoded = self
            .codec
            .encode(&message)
            .and_then(|bytes| self.codec.decode::<Message>(&bytes));
        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!(to = %to, error = %e, "dropping message that failed to encode");
                return;
            }
        };

        let handle = self.routes.borrow().get(&to).cloned();
        match handle {
            Some(handle) => {
                if handle.deliver(message).is_err() {
                    trace!(to = %to, "peer driver stopped");
                }
            }
            None => trace!(to = %to, "no route, dropping message"),
        }
    }
}
