//! Operator command lifecycle data
//!
//! A command is one CS→station CALL awaiting delivery and acknowledgment.
//! These are the pure data pieces; the stateful queueing lives in
//! [`crate::application::commands`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Command state machine.
///
/// ```text
/// Queued ─send─► Pending ─► Accepted | Rejected | Failed | Timeout
///    ▲                │
///    └── retry/requeue ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Pending,
    Accepted,
    Rejected,
    Failed,
    Timeout,
}

impl CommandStatus {
    /// Terminal states never transition again; their callback has fired or
    /// is about to.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Failed | Self::Timeout
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Immutable copy of a command's state, served from the snapshot index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSnapshot {
    pub id: String,
    pub station_id: String,
    pub action: String,
    pub status: CommandStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response: Option<Value>,
}

/// Delivered to the completion callback when a command reaches a terminal
/// state.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command_id: String,
    pub station_id: String,
    pub action: String,
    pub message_id: Option<String>,
    pub status: CommandStatus,
    pub attempts: u32,
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!CommandStatus::Queued.is_terminal());
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(CommandStatus::Accepted.is_terminal());
        assert!(CommandStatus::Rejected.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::Timeout.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CommandStatus::Accepted).unwrap(),
            "\"accepted\""
        );
    }
}
