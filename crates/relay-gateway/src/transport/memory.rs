//! In-memory socket pair
//!
//! Two cross-connected endpoints; whatever one side sends the other receives.
//! Useful for embedding the gateway without a network and for tests.

use super::TransportError;
use crate::protocol::Frame;
use futures::channel::mpsc;
use futures::{Sink, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

/// One end of an in-memory duplex socket
#[derive(Debug)]
pub struct MemorySocket {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

/// Create two connected sockets
#[must_use]
pub fn memory_pair() -> (MemorySocket, MemorySocket) {
    let (a_tx, a_rx) = mpsc::unbounded();
    let (b_tx, b_rx) = mpsc::unbounded();

    (
        MemorySocket {
            incoming: a_rx,
            outgoing: b_tx,
        },
        MemorySocket {
            incoming: b_rx,
            outgoing: a_tx,
        },
    )
}

impl Stream for MemorySocket {
    type Item = Result<Frame, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.incoming).poll_next(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<Frame> for MemorySocket {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.outgoing)
            .poll_ready(cx)
            .map_err(|_| TransportError::Closed)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        Pin::new(&mut self.outgoing)
            .start_send(item)
            .map_err(|_| TransportError::Closed)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.outgoing)
            .poll_flush(cx)
            .map_err(|_| TransportError::Closed)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.outgoing)
            .poll_close(cx)
            .map_err(|_| TransportError::Closed)
    }
}
