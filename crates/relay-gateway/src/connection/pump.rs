//! Read and write pumps
//!
//! Each connection runs two tasks. The write pump is the only task that writes
//! to the socket; it sends a heartbeat ping whenever the interval elapses and
//! otherwise drains the priority queue before the normal queue. The read pump
//! decodes inbound frames and hands them to the router. They share nothing but
//! the outbound queues and the connection's cancellation token.

use super::{Connection, OutboundQueues};
use crate::error::GatewayError;
use crate::events::{Event, EventType};
use crate::manager::GatewayState;
use crate::protocol::{CloseCode, Frame, Message, INVALID_MESSAGE_THRESHOLD};
use crate::transport::{Transport, TransportError};
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;

/// Split `transport` and start both pumps on `tracker`
pub(crate) fn spawn<T: Transport>(
    tracker: &TaskTracker,
    connection: Arc<Connection>,
    transport: T,
    queues: OutboundQueues,
    state: Arc<GatewayState>,
) {
    let (sink, stream) = transport.split();
    connection.mark_pumps_started();

    tracker.spawn(write_pump(Arc::clone(&connection), sink, queues, Arc::clone(&state)));

    tracker.spawn(async move {
        let result = AssertUnwindSafe(read_pump(Arc::clone(&connection), stream, state))
            .catch_unwind()
            .await;

        if result.is_err() {
            tracing::error!(connection_id = %connection.id(), "Read pump panicked");
            connection.close_with(CloseCode::InternalError).await;
        }
    });
}

async fn write_pump<S>(
    connection: Arc<Connection>,
    mut sink: S,
    mut queues: OutboundQueues,
    state: Arc<GatewayState>,
) where
    S: Sink<Frame, Error = TransportError> + Unpin,
{
    let config = state.config();
    let cancel = connection.cancel_token().clone();

    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let failure = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break None,
            // Ahead of the queues so a full queue cannot starve the ping.
            _ = heartbeat.tick() => Some(Frame::Ping(Vec::new())),
            frame = queues.priority.recv() => frame,
            frame = queues.normal.recv() => frame,
        };

        let Some(frame) = frame else {
            break None;
        };

        let len = frame.payload_len();
        match timeout(config.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {
                state.metrics().message_sent(len);
                tracing::trace!(connection_id = %connection.id(), bytes = len, "Frame written");
            }
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "Write failed");
                break Some(CloseCode::GoingAway);
            }
            Err(_) => {
                tracing::warn!(connection_id = %connection.id(), "Write timed out");
                break Some(CloseCode::GoingAway);
            }
        }
    };

    // Closed without a code means the owner's lifecycle was cancelled.
    let code = failure
        .or_else(|| connection.close_code())
        .unwrap_or(CloseCode::GoingAway);

    let goodbye = async {
        sink.send(Frame::close(code)).await?;
        sink.close().await
    };
    if let Ok(Err(e)) = timeout(config.write_timeout, goodbye).await {
        tracing::trace!(connection_id = %connection.id(), error = %e, "Close frame not delivered");
    }

    connection.mark_writer_done();
    connection.close_with(code).await;
}

async fn read_pump<St>(connection: Arc<Connection>, mut stream: St, state: Arc<GatewayState>)
where
    St: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    let config = state.config();
    let cancel = connection.cancel_token().clone();

    let code = loop {
        let deadline = connection.last_heartbeat() + config.heartbeat_timeout;

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                tracing::warn!(connection_id = %connection.id(), "Heartbeat timeout");
                break CloseCode::GoingAway;
            }
            Ok(None) => break CloseCode::Normal,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "Read failed");
                break CloseCode::GoingAway;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        if let ControlFlow::Break(code) = handle_frame(&connection, &state, frame).await {
            break code;
        }
    };

    connection.close_with(code).await;
}

async fn handle_frame(
    connection: &Arc<Connection>,
    state: &GatewayState,
    frame: Frame,
) -> ControlFlow<CloseCode> {
    match frame {
        Frame::Ping(data) => {
            connection.touch();
            if let Err(e) = connection.send_high_priority(Frame::Pong(data)) {
                tracing::debug!(connection_id = %connection.id(), error = %e, "Pong not queued");
            }
            ControlFlow::Continue(())
        }
        Frame::Pong(_) => {
            connection.touch();
            ControlFlow::Continue(())
        }
        Frame::Close(_) => {
            tracing::debug!(connection_id = %connection.id(), "Peer closed connection");
            ControlFlow::Break(CloseCode::Normal)
        }
        Frame::Text(_) | Frame::Binary(_) => {
            let size = frame.payload_len();
            let max = state.config().max_message_size;
            if size > max {
                let err = GatewayError::MessageTooLarge { size, max };
                tracing::warn!(connection_id = %connection.id(), error = %err, "Inbound message rejected");
                state.metrics().error(err.kind());
                return ControlFlow::Break(CloseCode::MessageTooBig);
            }

            let decoded = match frame.as_data() {
                Some(bytes) => Message::decode(bytes),
                None => Err(GatewayError::InvalidMessage("empty frame".to_string())),
            };

            match decoded {
                Ok(message) => {
                    connection.reset_invalid_messages();
                    state.metrics().message_received(size);
                    dispatch(connection, state, message).await;
                    ControlFlow::Continue(())
                }
                Err(err) => reject_invalid(connection, state, &err).await,
            }
        }
    }
}

async fn reject_invalid(
    connection: &Arc<Connection>,
    state: &GatewayState,
    err: &GatewayError,
) -> ControlFlow<CloseCode> {
    let count = connection.record_invalid_message();
    state.metrics().error(err.kind());
    tracing::debug!(
        connection_id = %connection.id(),
        error = %err,
        count,
        "Invalid inbound message"
    );

    let reply = Message::error(None, err.status_code(), err.to_string());
    let _ = connection.send_message(&reply);

    state
        .events()
        .publish(
            Event::new(EventType::Error, connection.id())
                .with_payload(serde_json::json!({ "code": err.status_code(), "message": err.to_string() })),
        )
        .await;

    if count > INVALID_MESSAGE_THRESHOLD {
        tracing::warn!(
            connection_id = %connection.id(),
            count,
            "Too many invalid messages, closing connection"
        );
        return ControlFlow::Break(CloseCode::PolicyViolation);
    }
    ControlFlow::Continue(())
}

async fn dispatch(connection: &Arc<Connection>, state: &GatewayState, message: Message) {
    state
        .events()
        .publish(
            Event::new(EventType::MessageReceived, connection.id())
                .with_payload(serde_json::json!({ "event": message.event, "type": message.kind })),
        )
        .await;

    let event = message.event.clone();
    let request_id = message.request_id.clone();
    tracing::debug!(connection_id = %connection.id(), event = %event, "Routing message");

    let reply = match state.router().route(Arc::clone(connection), message).await {
        Ok(reply) => reply,
        Err(err) => {
            state.metrics().error(err.kind());
            tracing::debug!(
                connection_id = %connection.id(),
                event = %event,
                error = %err,
                "Handler failed"
            );
            let mut reply = Message::error(request_id, err.status_code(), err.to_string());
            reply.event = event;
            Some(reply)
        }
    };

    if let Some(reply) = reply {
        if let Err(e) = connection.send_message(&reply) {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Reply not queued");
        }
    }
}
