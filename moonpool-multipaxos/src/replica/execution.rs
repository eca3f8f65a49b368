//! Applying the committed prefix of the log.

use tracing::{debug, trace};

use super::Replica;
use crate::environment::{Environment, StateMachine};
use crate::request::CommandReply;
use crate::types::Command;

impl<E: Environment, M: StateMachine> Replica<E, M> {
    /// Execute every committed slot at the cursor, in slot order.
    ///
    /// Stops at the first gap or uncommitted slot. No-ops advance the cursor
    /// without reaching the state machine. A slot that owns a client request
    /// answers it with the state machine's result.
    pub(super) fn execute_ready(&mut self) {
        while let Some(slot) = self.log.advance_cursor() {
            let Some(entry) = self.log.get_mut(slot) else {
                break;
            };
            let request = entry.take_request();

            match entry.command() {
                Command::Noop => {
                    trace!(replica = %self.id, slot = %slot, "skipping no-op");
                    if let Some(request) = request {
                        self.env.retry(request);
                    }
                }
                Command::Client(command) => {
                    let value = self.machine.execute(command);
                    debug!(replica = %self.id, slot = %slot, "executed");
                    if let Some(request) = request {
                        request.reply(CommandReply {
                            slot,
                            command: command.clone(),
                            value,
                        });
                    }
                }
            }
        }
    }
}
