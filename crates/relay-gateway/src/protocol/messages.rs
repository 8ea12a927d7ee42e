//! Wire message envelope
//!
//! Every application message on the socket is a JSON object of this shape.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Envelope type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Client request expecting a correlated response
    Request,
    /// Successful reply to a request
    Response,
    /// One-way message, no correlation id
    Notify,
    /// Failed reply (or unsolicited protocol error)
    Error,
}

impl MessageType {
    /// Get the string representation of the type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Notify => "notify",
            Self::Error => "error",
        }
    }

    /// Check if clients may send this type
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::Request | Self::Notify)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Envelope type
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Event name, used for routing
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,

    /// Correlation id pairing a request with its response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Opaque payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Status code (responses and errors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,

    /// Human readable status (responses and errors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Unix time in milliseconds
    #[serde(default)]
    pub timestamp: i64,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Message {
    /// Create a request
    #[must_use]
    pub fn request(event: impl Into<String>, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: MessageType::Request,
            event: event.into(),
            request_id: Some(request_id.into()),
            data: Some(data),
            code: None,
            message: None,
            timestamp: now_millis(),
        }
    }

    /// Create a successful response for `request_id`
    #[must_use]
    pub fn response(event: impl Into<String>, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: MessageType::Response,
            event: event.into(),
            request_id: Some(request_id.into()),
            data: Some(data),
            code: Some(200),
            message: Some("OK".to_string()),
            timestamp: now_millis(),
        }
    }

    /// Create a notification (never carries a correlation id)
    #[must_use]
    pub fn notify(event: impl Into<String>, data: Value) -> Self {
        Self {
            kind: MessageType::Notify,
            event: event.into(),
            request_id: None,
            data: Some(data),
            code: None,
            message: None,
            timestamp: now_millis(),
        }
    }

    /// Create an error envelope
    #[must_use]
    pub fn error(request_id: Option<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Error,
            event: String::new(),
            request_id,
            data: None,
            code: Some(code),
            message: Some(message.into()),
            timestamp: now_millis(),
        }
    }

    /// Create an error envelope answering this message
    #[must_use]
    pub fn error_reply(&self, err: &GatewayError) -> Self {
        let mut reply = Self::error(self.request_id.clone(), err.status_code(), err.to_string());
        reply.event.clone_from(&self.event);
        reply
    }

    /// Build the response to this message, if it expects one
    ///
    /// Notifications are one-way and produce `None`.
    #[must_use]
    pub fn reply(&self, data: Value) -> Option<Self> {
        match (self.kind, &self.request_id) {
            (MessageType::Request, Some(id)) => Some(Self::response(&self.event, id, data)),
            _ => None,
        }
    }

    /// Check envelope invariants for an inbound message
    pub fn validate(&self) -> GatewayResult<()> {
        if !self.kind.is_inbound() {
            return Err(GatewayError::InvalidMessageType(self.kind.to_string()));
        }
        if self.event.is_empty() {
            return Err(GatewayError::InvalidMessage("missing event".to_string()));
        }
        match self.kind {
            MessageType::Request if self.request_id.as_deref().map_or(true, str::is_empty) => Err(
                GatewayError::InvalidMessage("request without request_id".to_string()),
            ),
            MessageType::Notify if self.request_id.is_some() => Err(GatewayError::InvalidMessage(
                "notify must not carry request_id".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Decode and validate an inbound frame payload
    pub fn decode(bytes: &[u8]) -> GatewayResult<Self> {
        let message: Self = serde_json::from_slice(bytes)?;
        message.validate()?;
        Ok(message)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string without validation
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message(type={}", self.kind)?;
        if !self.event.is_empty() {
            write!(f, ", event={}", self.event)?;
        }
        if let Some(id) = &self.request_id {
            write!(f, ", request_id={id}")?;
        }
        write!(f, ")")
    }
}
