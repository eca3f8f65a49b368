//! The replica's volatile replicated log.
//!
//! Slots map to [`LogEntry`] values in a `BTreeMap`. A slot is in one of
//! three states, see [`SlotState`]: absent, accepted (a vote that may still
//! be replaced by a higher ballot), or committed (frozen forever).
//!
//! ```text
//!  slot:   0        1          2          3      4
//!        [sent] [committed] [accepted]  (gap) [accepted]
//!                   ^ executed  ^ execute_cursor        ^ highest_slot
//! ```
//!
//! The execution cursor only moves across contiguous committed entries;
//! slot 0 is a permanent committed sentinel so the cursor starts at slot 1.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::messages::PromisedEntry;
use crate::quorum::Quorum;
use crate::request::ClientRequest;
use crate::types::{Ballot, Command, Slot};

/// Whether an entry's value has been chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// A vote for `(ballot, command)`. A higher ballot may replace it.
    Accepted,
    /// The value is chosen. `(ballot, command)` never changes again.
    Committed,
}

/// A single slot of the log.
#[derive(Debug)]
pub struct LogEntry {
    ballot: Ballot,
    command: Command,
    status: EntryStatus,
    request: Option<ClientRequest>,
    acks: Quorum,
    proposed_at: Option<Duration>,
}

impl LogEntry {
    /// A vote learned from a peer.
    pub fn accepted(ballot: Ballot, command: Command) -> Self {
        Self {
            ballot,
            command,
            status: EntryStatus::Accepted,
            request: None,
            acks: Quorum::new(),
            proposed_at: None,
        }
    }

    /// A chosen value learned from a peer.
    pub fn committed(ballot: Ballot, command: Command) -> Self {
        Self {
            status: EntryStatus::Committed,
            ..Self::accepted(ballot, command)
        }
    }

    /// A value this replica proposes, optionally owning the client request.
    pub fn proposal(
        ballot: Ballot,
        command: Command,
        request: Option<ClientRequest>,
        now: Duration,
    ) -> Self {
        Self {
            request,
            proposed_at: Some(now),
            ..Self::accepted(ballot, command)
        }
    }

    /// The ballot the command was last (re)proposed under.
    pub fn ballot(&self) -> Ballot {
        self.ballot
    }

    /// The command held by this slot.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Accepted or committed.
    pub fn status(&self) -> EntryStatus {
        self.status
    }

    /// Whether the value is chosen.
    pub fn is_committed(&self) -> bool {
        self.status == EntryStatus::Committed
    }

    /// Whether this entry owns a client request.
    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    /// When this replica last proposed the entry, if it did.
    pub fn proposed_at(&self) -> Option<Duration> {
        self.proposed_at
    }

    /// Phase-2 acknowledgements for the current ballot.
    pub fn acks(&self) -> &Quorum {
        &self.acks
    }

    pub(crate) fn acks_mut(&mut self) -> &mut Quorum {
        &mut self.acks
    }

    pub(crate) fn take_request(&mut self) -> Option<ClientRequest> {
        self.request.take()
    }

    /// Replace an uncommitted value.
    ///
    /// Returns the owned request if the command changed: the request's slot
    /// was taken by another command and must be re-submitted.
    pub(crate) fn overwrite(&mut self, ballot: Ballot, command: Command) -> Option<ClientRequest> {
        debug_assert!(!self.is_committed(), "committed entries are frozen");
        let displaced = if self.command != command {
            self.request.take()
        } else {
            None
        };
        self.ballot = ballot;
        self.command = command;
        displaced
    }

    /// Restart the phase-2 round under `ballot`.
    pub(crate) fn repropose(&mut self, ballot: Ballot, now: Duration) {
        debug_assert!(!self.is_committed(), "committed entries are frozen");
        self.ballot = ballot;
        self.acks.reset();
        self.proposed_at = Some(now);
    }

    pub(crate) fn commit(&mut self) {
        self.status = EntryStatus::Committed;
    }
}

/// View of one slot.
#[derive(Debug)]
pub enum SlotState<'a> {
    /// Nothing is known about the slot.
    Absent,
    /// The slot holds a vote.
    Accepted(&'a LogEntry),
    /// The slot holds a chosen value.
    Committed(&'a LogEntry),
}

/// Slot-indexed log with an execution cursor.
#[derive(Debug)]
pub struct ReplicatedLog {
    entries: BTreeMap<Slot, LogEntry>,
    execute_cursor: Slot,
    highest_slot: Slot,
}

impl Default for ReplicatedLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedLog {
    /// An empty log holding only the committed sentinel.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            Slot::SENTINEL,
            LogEntry::committed(Ballot::ZERO, Command::Noop),
        );
        Self {
            entries,
            execute_cursor: Slot::FIRST,
            highest_slot: Slot::SENTINEL,
        }
    }

    /// Next slot to execute.
    pub fn execute_cursor(&self) -> Slot {
        self.execute_cursor
    }

    /// Highest slot known to exist, committed or not.
    pub fn highest_slot(&self) -> Slot {
        self.highest_slot
    }

    /// State of `slot`.
    pub fn state(&self, slot: Slot) -> SlotState<'_> {
        match self.entries.get(&slot) {
            None => SlotState::Absent,
            Some(entry) if entry.is_committed() => SlotState::Committed(entry),
            Some(entry) => SlotState::Accepted(entry),
        }
    }

    /// The entry at `slot`.
    pub fn get(&self, slot: Slot) -> Option<&LogEntry> {
        self.entries.get(&slot)
    }

    pub(crate) fn get_mut(&mut self, slot: Slot) -> Option<&mut LogEntry> {
        self.entries.get_mut(&slot)
    }

    /// Store a new entry at a slot that must be absent.
    pub(crate) fn insert(&mut self, slot: Slot, entry: LogEntry) -> &mut LogEntry {
        debug_assert!(!self.entries.contains_key(&slot), "{slot} already present");
        self.observe_slot(slot);
        self.entries.entry(slot).or_insert(entry)
    }

    /// Extend `highest_slot` to cover `slot`.
    pub(crate) fn observe_slot(&mut self, slot: Slot) {
        if slot > self.highest_slot {
            self.highest_slot = slot;
        }
    }

    /// Reserve the slot after `highest_slot`.
    pub(crate) fn allocate_slot(&mut self) -> Slot {
        self.highest_slot = self.highest_slot.next();
        self.highest_slot
    }

    /// Move the cursor past the entry at the cursor if it is committed.
    ///
    /// Returns the slot that became executable.
    pub(crate) fn advance_cursor(&mut self) -> Option<Slot> {
        let slot = self.execute_cursor;
        match self.entries.get(&slot) {
            Some(entry) if entry.is_committed() => {
                self.execute_cursor = slot.next();
                Some(slot)
            }
            _ => None,
        }
    }

    /// Everything known from `from` up to `highest_slot`, as reported in a
    /// promise.
    pub fn promised_entries(&self, from: Slot) -> BTreeMap<Slot, PromisedEntry> {
        let from = from.max(Slot::FIRST);
        if from > self.highest_slot {
            return BTreeMap::new();
        }
        self.entries
            .range(from..=self.highest_slot)
            .map(|(slot, entry)| {
                (
                    *slot,
                    PromisedEntry {
                        command: entry.command.clone(),
                        ballot: entry.ballot,
                        committed: entry.is_committed(),
                    },
                )
            })
            .collect()
    }

    /// Whether an uncommitted entry still owns a client request.
    pub fn has_owned_uncommitted(&self) -> bool {
        self.entries
            .range(self.execute_cursor..)
            .any(|(_, entry)| !entry.is_committed() && entry.has_request())
    }

    /// Committed entries, sentinel excluded.
    pub fn committed(&self) -> impl Iterator<Item = (Slot, &LogEntry)> {
        self.entries
            .range(Slot::FIRST..)
            .filter(|(_, entry)| entry.is_committed())
            .map(|(slot, entry)| (*slot, entry))
    }
}
