//! Command lifecycle state machine
//!
//! Implements the per-command state machine described by the command queue
//! (C3): `pending -> sent -> acknowledged|error|notnow -> pending`.
//! `acknowledged` and `error` are terminal; `notnow` loops back to `pending`
//! so the command is redelivered on the device's next Connect.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Sent,
    Acknowledged,
    Error,
    NotNow,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Acknowledged => "acknowledged",
            CommandStatus::Error => "error",
            CommandStatus::NotNow => "notnow",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "sent" => Ok(CommandStatus::Sent),
            "acknowledged" => Ok(CommandStatus::Acknowledged),
            "error" => Ok(CommandStatus::Error),
            "notnow" => Ok(CommandStatus::NotNow),
            other => Err(Error::Internal(format!("unknown command status: {other}"))),
        }
    }
}

/// Events that drive a command through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEvent {
    /// Delivered to the device in a Connect response.
    Sent,
    /// Device reported `Acknowledged` for this command.
    Acknowledged,
    /// Device reported `Error` for this command.
    Error,
    /// Device reported `NotNow` for this command; return to `pending`.
    NotNow,
}

/// A command's state machine. Holds only the current state; the caller is
/// responsible for persisting the transition result.
pub struct CommandStateMachine {
    current: CommandStatus,
}

impl CommandStateMachine {
    /// New commands always start `pending`.
    pub fn new() -> Self {
        Self {
            current: CommandStatus::Pending,
        }
    }

    /// Restore a state machine from a persisted status (e.g. after a
    /// process restart).
    pub fn from_status(status: CommandStatus) -> Self {
        Self { current: status }
    }

    pub fn status(&self) -> CommandStatus {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.current, CommandStatus::Acknowledged | CommandStatus::Error)
    }

    /// Attempt a transition. Rejects illegal transitions (e.g.
    /// `Acknowledged -> Sent`) with `Error::InvalidState`.
    pub fn transition(&mut self, event: CommandEvent) -> Result<CommandStatus> {
        let next = match (self.current, event) {
            (CommandStatus::Pending, CommandEvent::Sent) => CommandStatus::Sent,
            (CommandStatus::Sent, CommandEvent::Acknowledged) => CommandStatus::Acknowledged,
            (CommandStatus::Sent, CommandEvent::Error) => CommandStatus::Error,
            (CommandStatus::Sent, CommandEvent::NotNow) => CommandStatus::NotNow,
            (CommandStatus::NotNow, CommandEvent::Sent) => CommandStatus::Sent,
            (current, event) => {
                return Err(Error::InvalidState(format!(
                    "cannot apply {event:?} to command in state {current:?}"
                )));
            }
        };
        self.current = next;
        Ok(next)
    }
}

impl Default for CommandStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_command_is_pending() {
        let sm = CommandStateMachine::new();
        assert_eq!(sm.status(), CommandStatus::Pending);
        assert!(!sm.is_terminal());
    }

    #[test]
    fn happy_path_pending_sent_acknowledged() {
        let mut sm = CommandStateMachine::new();
        assert_eq!(sm.transition(CommandEvent::Sent).unwrap(), CommandStatus::Sent);
        assert_eq!(
            sm.transition(CommandEvent::Acknowledged).unwrap(),
            CommandStatus::Acknowledged
        );
        assert!(sm.is_terminal());
    }

    #[test]
    fn notnow_loops_back_to_pending_delivery() {
        let mut sm = CommandStateMachine::new();
        sm.transition(CommandEvent::Sent).unwrap();
        assert_eq!(sm.transition(CommandEvent::NotNow).unwrap(), CommandStatus::NotNow);
        assert_eq!(sm.transition(CommandEvent::Sent).unwrap(), CommandStatus::Sent);
    }

    #[test]
    fn acknowledged_is_terminal() {
        let mut sm = CommandStateMachine::from_status(CommandStatus::Acknowledged);
        assert!(sm.transition(CommandEvent::Sent).is_err());
    }

    #[test]
    fn error_is_terminal() {
        let mut sm = CommandStateMachine::from_status(CommandStatus::Error);
        assert!(sm.transition(CommandEvent::NotNow).is_err());
    }

    #[test]
    fn cannot_acknowledge_before_sent() {
        let mut sm = CommandStateMachine::new();
        assert!(sm.transition(CommandEvent::Acknowledged).is_err());
    }
}
