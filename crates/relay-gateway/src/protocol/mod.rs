//! Gateway protocol definitions
//!
//! Defines the JSON message envelope, transport frames, and close codes.

mod close_codes;
mod frame;
mod messages;

pub use close_codes::CloseCode;
pub use frame::{CloseFrame, Frame};
pub use messages::{Message, MessageType};

/// Consecutive undecodable messages tolerated before the connection is dropped
pub const INVALID_MESSAGE_THRESHOLD: u32 = 10;
