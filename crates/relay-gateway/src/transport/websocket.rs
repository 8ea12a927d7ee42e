//! axum WebSocket adapter

use super::TransportError;
use crate::protocol::{CloseFrame, Frame};
use axum::extract::ws::{self, WebSocket};
use futures::{Sink, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Wraps an upgraded axum `WebSocket` as a gateway transport
#[derive(Debug)]
pub struct AxumSocket {
    inner: WebSocket,
}

impl AxumSocket {
    #[must_use]
    pub fn new(inner: WebSocket) -> Self {
        Self { inner }
    }
}

impl From<ws::Message> for Frame {
    fn from(message: ws::Message) -> Self {
        match message {
            ws::Message::Text(text) => Self::Text(text),
            ws::Message::Binary(data) => Self::Binary(data),
            ws::Message::Ping(data) => Self::Ping(data),
            ws::Message::Pong(data) => Self::Pong(data),
            ws::Message::Close(frame) => Self::Close(frame.map(|f| CloseFrame {
                code: f.code,
                reason: f.reason.into_owned(),
            })),
        }
    }
}

impl From<Frame> for ws::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text),
            Frame::Binary(data) => Self::Binary(data),
            Frame::Ping(data) => Self::Ping(data),
            Frame::Pong(data) => Self::Pong(data),
            Frame::Close(frame) => Self::Close(frame.map(|f| ws::CloseFrame {
                code: f.code,
                reason: f.reason.into(),
            })),
        }
    }
}

fn transport_error(err: axum::Error) -> TransportError {
    TransportError::Io(err.to_string())
}

impl Stream for AxumSocket {
    type Item = Result<Frame, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|item| item.map(|res| res.map(Frame::from).map_err(transport_error)))
    }
}

impl Sink<Frame> for AxumSocket {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_ready(cx).map_err(transport_error)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner)
            .start_send(item.into())
            .map_err(transport_error)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(transport_error)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner).poll_close(cx).map_err(transport_error)
    }
}
