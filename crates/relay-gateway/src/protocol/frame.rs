//! Transport-level frames

use super::{CloseCode, Message};

/// Close frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl From<CloseCode> for CloseFrame {
    fn from(code: CloseCode) -> Self {
        Self {
            code: code.as_u16(),
            reason: code.description().to_string(),
        }
    }
}

/// A single WebSocket frame, independent of the socket implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Frame {
    /// Serialize a message into a text frame
    pub fn message(message: &Message) -> Result<Self, serde_json::Error> {
        message.to_json().map(Self::Text)
    }

    /// Close frame carrying `code`
    #[must_use]
    pub fn close(code: CloseCode) -> Self {
        Self::Close(Some(code.into()))
    }

    /// Payload length in bytes (data frames only)
    #[must_use]
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data.len(),
            Self::Close(_) => 0,
        }
    }

    /// Borrow the payload of a data frame
    #[must_use]
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Binary(data) => Some(data),
            _ => None,
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}
