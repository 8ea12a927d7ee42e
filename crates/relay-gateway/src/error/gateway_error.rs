//! Gateway error types

use relay_common::{AppError, ConfigError};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad failure classes, used for status codes and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Capacity,
    Conflict,
    NotFound,
    Protocol,
    Backpressure,
    Timeout,
    State,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// Get the string representation of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Protocol => "protocol",
            Self::Backpressure => "backpressure",
            Self::Timeout => "timeout",
            Self::State => "state",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the real-time core
#[derive(Debug, Error)]
pub enum GatewayError {
    // Capacity
    #[error("Too many connections (max {max})")]
    TooManyConnections { max: usize },

    #[error("Room {room_id} is full (capacity {capacity})")]
    RoomFull { room_id: String, capacity: usize },

    // Conflict
    #[error("Duplicate connection id: {0}")]
    DuplicateConnection(String),

    #[error("Room already exists: {0}")]
    RoomExists(String),

    #[error("Connection {connection_id} is already in room {room_id}")]
    AlreadyInRoom {
        room_id: String,
        connection_id: String,
    },

    #[error("Handler already registered for event: {0}")]
    DuplicateHandler(String),

    // Not found
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("No handler registered for event: {0}")]
    HandlerNotFound(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    // Protocol
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid message type: {0}")]
    InvalidMessageType(String),

    // Backpressure
    #[error("Send queue full")]
    QueueFull,

    // Timeout
    #[error("Broadcast timed out after {0:?}")]
    BroadcastTimeout(Duration),

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    // State
    #[error("Router is frozen")]
    RouterFrozen,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Gateway is shutting down")]
    ShuttingDown,

    // Configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Application-level failure raised by a handler, carrying its own status
    #[error("{message}")]
    Handler { code: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooManyConnections { .. } | Self::RoomFull { .. } => ErrorKind::Capacity,
            Self::DuplicateConnection(_)
            | Self::RoomExists(_)
            | Self::AlreadyInRoom { .. }
            | Self::DuplicateHandler(_) => ErrorKind::Conflict,
            Self::RoomNotFound(_) | Self::HandlerNotFound(_) | Self::ConnectionNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidMessage(_) | Self::MessageTooLarge { .. } | Self::InvalidMessageType(_) => {
                ErrorKind::Protocol
            }
            Self::QueueFull => ErrorKind::Backpressure,
            Self::BroadcastTimeout(_) | Self::ShutdownTimeout(_) => ErrorKind::Timeout,
            Self::RouterFrozen | Self::ConnectionClosed | Self::ShuttingDown => ErrorKind::State,
            Self::Config(_) => ErrorKind::Configuration,
            Self::Handler { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Status code placed in the `code` field of error envelopes
    #[must_use]
    pub fn status_code(&self) -> u16 {
        if let Self::Handler { code, .. } = self {
            return *code;
        }
        match self.kind() {
            ErrorKind::Capacity => 503,
            ErrorKind::Conflict | ErrorKind::State => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Protocol => 400,
            ErrorKind::Backpressure => 429,
            ErrorKind::Timeout => 504,
            ErrorKind::Configuration | ErrorKind::Internal => 500,
        }
    }

    /// Whether the caller may reasonably retry the same operation later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Capacity | ErrorKind::Backpressure | ErrorKind::Timeout
        )
    }

    /// Create a handler error with an explicit status code
    #[must_use]
    pub fn handler(code: u16, message: impl fmt::Display) -> Self {
        Self::Handler {
            code,
            message: message.to_string(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::Internal(message.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMessage(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Config(e) => Self::Config(e),
            GatewayError::TooManyConnections { .. } | GatewayError::ShuttingDown => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Server(other.to_string()),
        }
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
