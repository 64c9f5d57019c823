//! Frame definitions
//!
//! Inbound frames come from editors, outbound frames from the hub.

use super::PresenceSnapshot;
use serde::{Deserialize, Serialize};

/// Frames a client may send on an active connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The editor switched to another section (tab)
    TabChange { tab: String },
    /// Keepalive; resets the idle timer
    Heartbeat,
}

impl ClientMessage {
    /// Build a tab change frame
    #[must_use]
    pub fn tab_change(tab: impl Into<String>) -> Self {
        Self::TabChange { tab: tab.into() }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Frames the hub sends to a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame of every session
    Hello {
        session_id: String,
        /// Milliseconds between client heartbeats
        heartbeat_interval: u64,
    },
    /// Full presence snapshot for the room
    Presence {
        /// Increases with every snapshot a room emits
        version: u64,
        presence: PresenceSnapshot,
    },
    /// A dataset of the document changed; cached copies are stale
    Change { table: String },
    /// Reply to a client heartbeat
    HeartbeatAck,
}

impl ServerMessage {
    /// Build a change notification
    #[must_use]
    pub fn change(table: impl Into<String>) -> Self {
        Self::Change { table: table.into() }
    }

    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Presence { .. } => "presence",
            Self::Change { .. } => "change",
            Self::HeartbeatAck => "heartbeat_ack",
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Presence { version, .. } => write!(f, "ServerMessage(presence, v={version})"),
            Self::Change { table } => write!(f, "ServerMessage(change, table={table})"),
            other => write!(f, "ServerMessage({})", other.kind()),
        }
    }
}
