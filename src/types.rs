//! Session state and the snapshot value handed to external consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix added to snapshot output when the response cap truncates it.
/// Downstream consumers key off this exact text; do not change it.
pub const TRUNCATION_MARKER: &str = "… (output truncated) …\n";

/// Lifecycle of a session: `Pending → Running → {Completed, Failed,
/// Cancelled}`. Terminal states are final; a session is never revived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Immutable, size-capped view of a session, safe to hand to any caller.
/// The surrounding service serializes this as JSON; field names are part of
/// that contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "session_id")]
    pub id: String,
    pub command: String,
    #[serde(rename = "status")]
    pub state: SessionState,
    pub output: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::from_str::<SessionState>("\"running\"").unwrap(),
            SessionState::Running
        );
    }

    #[test]
    fn snapshot_wire_field_names() {
        let snap = Snapshot {
            id: "abc".into(),
            command: "echo hi".into(),
            state: SessionState::Running,
            output: String::new(),
            started_at: None,
            completed_at: None,
        };
        let value = serde_json::to_value(&snap).unwrap();
        assert!(value.get("session_id").is_some());
        assert_eq!(value["status"], "running");
        assert!(value.get("state").is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }
}
