//! Socket abstraction
//!
//! The gateway drives any already-negotiated, frame-oriented duplex socket. The
//! HTTP layer performs the upgrade and hands the result over through one of the
//! adapters below.

mod memory;
mod websocket;

pub use memory::{memory_pair, MemorySocket};
pub use websocket::AxumSocket;

use crate::protocol::Frame;
use futures::{Sink, Stream};
use thiserror::Error;

/// Socket failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer went away or the socket was already closed
    #[error("Socket closed")]
    Closed,

    /// Underlying IO or protocol failure
    #[error("Socket error: {0}")]
    Io(String),
}

/// An upgraded bidirectional socket
pub trait Transport:
    Stream<Item = Result<Frame, TransportError>>
    + Sink<Frame, Error = TransportError>
    + Send
    + Unpin
    + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Frame, TransportError>>
        + Sink<Frame, Error = TransportError>
        + Send
        + Unpin
        + 'static
{
}
