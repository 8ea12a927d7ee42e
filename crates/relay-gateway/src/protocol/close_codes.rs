//! WebSocket close codes
//!
//! The subset of RFC 6455 close codes the gateway sends when it ends a connection.

use serde::{Deserialize, Serialize};

/// Close codes sent in the final Close frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure
    Normal = 1000,
    /// Server shutting down or peer went silent
    GoingAway = 1001,
    /// Peer violated the protocol
    ProtocolError = 1002,
    /// Peer kept sending invalid messages
    PolicyViolation = 1008,
    /// Frame exceeded the configured size limit
    MessageTooBig = 1009,
    /// Unexpected server-side failure
    InternalError = 1011,
    /// Server at capacity, retry later
    TryAgainLater = 1013,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1011 => Some(Self::InternalError),
            1013 => Some(Self::TryAgainLater),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Check if the client should attempt to reconnect after this close code
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        matches!(
            self,
            Self::GoingAway | Self::InternalError | Self::TryAgainLater
        )
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Normal closure",
            Self::GoingAway => "Going away",
            Self::ProtocolError => "Protocol error",
            Self::PolicyViolation => "Too many invalid messages",
            Self::MessageTooBig => "Message too big",
            Self::InternalError => "Internal error",
            Self::TryAgainLater => "Server at capacity",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
