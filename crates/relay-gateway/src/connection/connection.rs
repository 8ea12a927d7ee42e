//! Individual connection handle
//!
//! Owns the outbound queues of one socket session and its teardown. The socket
//! itself lives in the pump tasks; this handle is what the rest of the gateway
//! holds on to.

use super::ConnectOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{Event, EventType};
use crate::manager::GatewayState;
use crate::metrics::MetricsSink;
use crate::protocol::{CloseCode, Frame, Message};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Queue = RwLock<Option<mpsc::Sender<Frame>>>;

/// Receiving ends of a connection's outbound queues, consumed by the write pump
#[derive(Debug)]
pub struct OutboundQueues {
    pub normal: mpsc::Receiver<Frame>,
    pub priority: mpsc::Receiver<Frame>,
}

/// A single live socket session
pub struct Connection {
    id: String,
    user_id: RwLock<Option<String>>,
    metadata: RwLock<HashMap<String, Value>>,

    normal: Queue,
    priority: Queue,

    closed: AtomicBool,
    close_code: Mutex<Option<CloseCode>>,
    cancel: CancellationToken,
    writer_done: CancellationToken,
    pumps_started: AtomicBool,

    last_heartbeat: Mutex<Instant>,
    invalid_messages: AtomicU32,

    /// Rooms this connection has joined
    rooms: RwLock<HashSet<String>>,

    connected_at: DateTime<Utc>,
    close_timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
    state: Weak<GatewayState>,
}

impl Connection {
    /// Generate a fresh connection id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Create a handle bound to `state`
    ///
    /// `cancel` should be derived from the owner's lifecycle token so that
    /// cancelling the owner stops this connection's pumps.
    pub fn new(
        state: &Arc<GatewayState>,
        options: ConnectOptions,
        cancel: CancellationToken,
    ) -> (Arc<Self>, OutboundQueues) {
        let config = state.config();
        let (normal_tx, normal_rx) = mpsc::channel(config.send_queue_size);
        let (priority_tx, priority_rx) = mpsc::channel(config.priority_queue_size);

        let connection = Arc::new(Self {
            id: Self::generate_id(),
            user_id: RwLock::new(options.user_id),
            metadata: RwLock::new(options.metadata),
            normal: RwLock::new(Some(normal_tx)),
            priority: RwLock::new(Some(priority_tx)),
            closed: AtomicBool::new(false),
            close_code: Mutex::new(None),
            cancel,
            writer_done: CancellationToken::new(),
            pumps_started: AtomicBool::new(false),
            last_heartbeat: Mutex::new(Instant::now()),
            invalid_messages: AtomicU32::new(0),
            rooms: RwLock::new(HashSet::new()),
            connected_at: Utc::now(),
            close_timeout: config.close_timeout,
            metrics: Arc::clone(state.metrics()),
            state: Arc::downgrade(state),
        });

        let queues = OutboundQueues {
            normal: normal_rx,
            priority: priority_rx,
        };

        (connection, queues)
    }

    /// Get the connection id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the associated user id, if any
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Associate the connection with a user
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        *self.user_id.write() = Some(user_id.into());
    }

    /// Read one metadata entry
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.read().get(key).cloned()
    }

    /// Set one metadata entry
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// The gateway this connection belongs to
    ///
    /// Fails once the gateway has been dropped.
    pub fn gateway(&self) -> GatewayResult<Arc<GatewayState>> {
        self.state.upgrade().ok_or(GatewayError::ConnectionClosed)
    }

    /// Queue a frame on the normal-priority queue without blocking
    pub fn send(&self, frame: Frame) -> GatewayResult<()> {
        self.enqueue(&self.normal, frame)
    }

    /// Queue a frame on the high-priority queue without blocking
    pub fn send_high_priority(&self, frame: Frame) -> GatewayResult<()> {
        self.enqueue(&self.priority, frame)
    }

    /// Serialize and queue a message on the normal-priority queue
    pub fn send_message(&self, message: &Message) -> GatewayResult<()> {
        let frame = Frame::message(message).map_err(GatewayError::internal)?;
        self.send(frame)
    }

    fn enqueue(&self, queue: &Queue, frame: Frame) -> GatewayResult<()> {
        if self.is_closed() {
            return Err(GatewayError::ConnectionClosed);
        }

        let guard = queue.read();
        let Some(sender) = guard.as_ref() else {
            return Err(GatewayError::ConnectionClosed);
        };

        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.message_dropped();
                tracing::warn!(connection_id = %self.id, "Send queue full");
                Err(GatewayError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(GatewayError::ConnectionClosed),
        }
    }

    /// Check if teardown has started
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close with a normal close code
    pub async fn close(&self) {
        self.close_with(CloseCode::Normal).await;
    }

    /// Tear the connection down
    ///
    /// Runs once no matter how many callers race here: marks the handle
    /// closed, cancels its pumps, deregisters it, leaves every joined room,
    /// waits (bounded) for the write pump to flush the close frame, drops the
    /// outbound queues and finally publishes a disconnect event.
    pub async fn close_with(&self, code: CloseCode) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.close_code.lock().get_or_insert(code);
        self.cancel.cancel();

        let state = self.state.upgrade();
        if let Some(state) = &state {
            state.connections().remove_handle(self);
            for room_id in self.room_ids() {
                state.rooms().leave_room(self, &room_id);
            }
        }

        if self.pumps_started.load(Ordering::SeqCst)
            && tokio::time::timeout(self.close_timeout, self.writer_done.cancelled())
                .await
                .is_err()
        {
            tracing::warn!(
                connection_id = %self.id,
                timeout = ?self.close_timeout,
                "Write pump did not stop in time, closing queues anyway"
            );
        }

        self.normal.write().take();
        self.priority.write().take();

        self.metrics.connection_closed();
        tracing::info!(connection_id = %self.id, code = %code, "Connection closed");

        if let Some(state) = state {
            let event = Event::new(EventType::Disconnected, self.id.clone())
                .with_payload(serde_json::json!({ "code": code.as_u16() }));
            state.events().publish(event).await;
        }
    }

    /// Drop a handle that never made it into the registry
    ///
    /// No events or metrics are emitted; the caller reports the rejection.
    pub(crate) fn discard(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.normal.write().take();
        self.priority.write().take();
    }

    /// Code the write pump sends in its final close frame
    ///
    /// `None` until a close has been requested through this handle.
    pub fn close_code(&self) -> Option<CloseCode> {
        *self.close_code.lock()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn mark_pumps_started(&self) {
        self.pumps_started.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_writer_done(&self) {
        self.writer_done.cancel();
    }

    /// Record a liveness signal from the peer
    pub fn touch(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// Time of the last liveness signal
    pub fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock()
    }

    /// Count one invalid inbound message, returning the running total
    pub(crate) fn record_invalid_message(&self) -> u32 {
        self.invalid_messages.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset_invalid_messages(&self) {
        self.invalid_messages.store(0, Ordering::SeqCst);
    }

    /// Consecutive invalid messages received so far
    pub fn invalid_message_count(&self) -> u32 {
        self.invalid_messages.load(Ordering::SeqCst)
    }

    /// Ids of the rooms this connection has joined
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.read().iter().cloned().collect()
    }

    /// Check room membership
    pub fn is_in_room(&self, room_id: &str) -> bool {
        self.rooms.read().contains(room_id)
    }

    pub(crate) fn remember_room(&self, room_id: &str) {
        self.rooms.write().insert(room_id.to_string());
    }

    pub(crate) fn forget_room(&self, room_id: &str) {
        self.rooms.write().remove(room_id);
    }

    /// When the connection was accepted
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Get a serializable snapshot
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            user_id: self.user_id(),
            rooms: self.room_ids(),
            connected_at: self.connected_at,
            closed: self.is_closed(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &*self.user_id.read())
            .field("closed", &self.is_closed())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Snapshot of connection state
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub user_id: Option<String>,
    pub rooms: Vec<String>,
    pub connected_at: DateTime<Utc>,
    pub closed: bool,
}
