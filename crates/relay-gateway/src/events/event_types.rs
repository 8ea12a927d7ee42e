//! System event types
//!
//! Notifications published on the event bus. They are informational only; the
//! data path never depends on their delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Connection registered and its pumps started
    Connected,
    /// Connection finished teardown
    Disconnected,
    /// Inbound message decoded, before routing
    MessageReceived,
    /// Error reported back to a connection
    Error,
}

impl EventType {
    /// Get the string representation of the event type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::MessageReceived => "message_received",
            Self::Error => "error",
        }
    }

    /// Lifecycle events get a bounded blocking wait on publish instead of an
    /// immediate drop
    #[must_use]
    pub const fn is_lifecycle(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable system notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event for `connection_id`
    #[must_use]
    pub fn new(kind: EventType, connection_id: impl Into<String>) -> Self {
        Self {
            kind,
            connection_id: connection_id.into(),
            payload: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
