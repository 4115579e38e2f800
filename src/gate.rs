//! Confirmation gate: a per-command state machine guarding mutating
//! actions.
//!
//! Each proposed command moves `Proposed → {Confirmed, Rejected, Expired}`
//! exactly once. The session owns one gate and at most one pending
//! command at a time; terminal ids are remembered so late or duplicate
//! confirmations fail with `StaleConfirmation` instead of re-dispatching.

use crate::defaults;
use crate::error::{Result, StockhandError};
use crate::interpret::ParsedCommand;
use log::debug;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Terminal state of a resolved command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Confirmed,
    Rejected,
    Expired,
}

/// Client decision on a proposed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Confirm,
    Reject,
}

/// A command waiting for the client's decision.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub id: Uuid,
    pub command: ParsedCommand,
    pub summary: String,
    pub deadline: Instant,
}

pub struct ConfirmationGate {
    window: Duration,
    pending: Option<PendingCommand>,
    resolved: VecDeque<(Uuid, Terminal)>,
}

impl ConfirmationGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            resolved: VecDeque::new(),
        }
    }

    /// Propose a command; at most one may be pending.
    pub fn propose(&mut self, command: ParsedCommand) -> Result<&PendingCommand> {
        if self.pending.is_some() {
            return Err(StockhandError::Other(
                "a command is already awaiting confirmation".to_string(),
            ));
        }
        let summary = command.summary();
        let pending = PendingCommand {
            id: Uuid::new_v4(),
            command,
            summary,
            deadline: Instant::now() + self.window,
        };
        debug!("proposed command {} ({})", pending.id, pending.summary);
        Ok(self.pending.insert(pending))
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Deadline of the pending command, for the session's expiry timer.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Apply the client's decision to the command with the given id.
    ///
    /// `Ok(Some(command))` means confirmed and ready for dispatch,
    /// `Ok(None)` means rejected. Unknown, already-resolved, and expired
    /// ids fail with `StaleConfirmation`.
    pub fn resolve(&mut self, id: &str, resolution: Resolution) -> Result<Option<ParsedCommand>> {
        let stale = || StockhandError::StaleConfirmation {
            command_id: id.to_string(),
        };
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Err(stale());
        };

        let Some(pending) = self.pending.take_if(|p| p.id == uuid) else {
            return Err(stale());
        };

        // Lazy expiry: the decision raced the deadline.
        if Instant::now() > pending.deadline {
            debug!("command {} expired before its confirmation arrived", uuid);
            self.record(uuid, Terminal::Expired);
            return Err(stale());
        }

        match resolution {
            Resolution::Confirm => {
                self.record(uuid, Terminal::Confirmed);
                Ok(Some(pending.command))
            }
            Resolution::Reject => {
                self.record(uuid, Terminal::Rejected);
                Ok(None)
            }
        }
    }

    /// Expire the pending command if its deadline has passed, returning
    /// the discarded entry.
    pub fn expire_due(&mut self) -> Option<PendingCommand> {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| Instant::now() >= p.deadline)
        {
            return self.expire_pending();
        }
        None
    }

    /// Drop the pending command on session teardown.
    pub fn discard(&mut self) -> Option<PendingCommand> {
        self.pending.take()
    }

    fn expire_pending(&mut self) -> Option<PendingCommand> {
        let pending = self.pending.take()?;
        debug!("command {} expired without confirmation", pending.id);
        self.record(pending.id, Terminal::Expired);
        Some(pending)
    }

    fn record(&mut self, id: Uuid, terminal: Terminal) {
        if self.resolved.len() >= defaults::RESOLVED_COMMAND_MEMORY {
            self.resolved.pop_front();
        }
        self.resolved.push_back((id, terminal));
    }

    /// Terminal state of a previously resolved command, if remembered.
    pub fn terminal_state(&self, id: &Uuid) -> Option<Terminal> {
        self.resolved
            .iter()
            .rev()
            .find(|(resolved, _)| resolved == id)
            .map(|(_, terminal)| *terminal)
    }
}
