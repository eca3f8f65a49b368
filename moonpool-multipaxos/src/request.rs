//! Client requests and their replies.
//!
//! A [`ClientRequest`] is an exclusively owned resource: it lives in the
//! pending queue, then inside the log entry that proposes its command, and is
//! consumed exactly once, either by [`ClientRequest::reply`] after execution
//! or by being handed back to the environment for a retry.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::types::Slot;

/// Reply delivered to a client once its command executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    /// The slot the command executed in.
    pub slot: Slot,

    /// The command that executed.
    pub command: Vec<u8>,

    /// The value returned by the state machine.
    pub value: Vec<u8>,
}

/// A client command waiting to be agreed on and executed.
#[derive(Debug)]
pub struct ClientRequest {
    command: Vec<u8>,
    reply: oneshot::Sender<CommandReply>,
}

impl ClientRequest {
    /// Create a request and the receiver its reply will arrive on.
    pub fn new(command: Vec<u8>) -> (Self, oneshot::Receiver<CommandReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { command, reply: tx }, rx)
    }

    /// The serialized command.
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Whether the client still waits for the reply.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    /// Deliver the reply, consuming the request.
    pub fn reply(self, reply: CommandReply) {
        let slot = reply.slot;
        if self.reply.send(reply).is_err() {
            debug!(slot = %slot, "client went away before the reply");
        }
    }
}
