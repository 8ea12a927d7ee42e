//! Gateway manager
//!
//! Public façade over the connection and room registries, the router and the
//! event bus. Lifecycle operations live in `lifecycle.rs`.

use super::GatewayState;
use crate::broadcast::{fan_out, BroadcastReport};
use crate::connection::{Connection, ConnectionInfo};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{Event, EventType};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::protocol::Frame;
use crate::room::{Room, RoomInfo, RoomOptions};
use crate::router::{Handler, Middleware};
use relay_common::GatewayConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Owns one gateway instance
pub struct Manager {
    pub(super) state: Arc<GatewayState>,
    pub(super) lifecycle: CancellationToken,
    pub(super) tracker: TaskTracker,
    pub(super) started: AtomicBool,
    pub(super) shutting_down: AtomicBool,
}

/// Point-in-time gateway counters
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub connections: usize,
    pub max_connections: usize,
    pub rooms: usize,
    pub dropped_events: u64,
    pub router_frozen: bool,
    pub shutting_down: bool,
}

impl Manager {
    /// Create a manager with the no-op metrics sink
    ///
    /// Fails if `config` does not validate.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Create a manager reporting to `metrics`
    pub fn with_metrics(config: GatewayConfig, metrics: Arc<dyn MetricsSink>) -> GatewayResult<Self> {
        config.validate()?;

        Ok(Self {
            state: GatewayState::new_shared(config, metrics),
            lifecycle: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Get the shared gateway state
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Get the gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        self.state.config()
    }

    // Routing

    /// Bind a handler to an event name
    pub fn register<H: Handler>(&self, event: impl Into<String>, handler: H) -> GatewayResult<()> {
        self.state.router().register(event, handler)
    }

    /// Bind a typed handler to an event name
    pub fn register_typed<Req, Resp, F, Fut>(&self, event: impl Into<String>, f: F) -> GatewayResult<()>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<Connection>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatewayResult<Resp>> + Send + 'static,
    {
        self.state.router().register_typed(event, f)
    }

    /// Append a middleware to the router chain
    pub fn use_middleware<M: Middleware>(&self, middleware: M) -> GatewayResult<()> {
        self.state.router().use_middleware(middleware)
    }

    /// Subscribe to one event type
    pub fn subscribe<F>(&self, kind: EventType, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.state.events().subscribe(kind, handler);
    }

    // Connections

    /// Look up a live connection
    pub fn connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.state.connections().get(id)
    }

    /// Serializable snapshot of a live connection
    pub fn connection_info(&self, id: &str) -> Option<ConnectionInfo> {
        self.connection(id).map(|connection| connection.info())
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.state.connections().count()
    }

    /// Check if a new upgrade would be rejected for capacity
    pub fn is_at_capacity(&self) -> bool {
        self.state.connections().is_at_capacity()
    }

    /// Check if [`Manager::shutdown`] has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    // Rooms

    /// Create a room
    pub fn create_room(&self, id: impl Into<String>, options: RoomOptions) -> GatewayResult<Arc<Room>> {
        self.state.rooms().create_room(id, options)
    }

    /// Look up a room
    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.state.rooms().get_room(id)
    }

    /// Snapshot of a room
    pub fn room_info(&self, id: &str) -> Option<RoomInfo> {
        self.state.rooms().info(id)
    }

    /// Delete a room, evicting its members
    pub fn delete_room(&self, id: &str) -> GatewayResult<()> {
        self.state.rooms().delete_room(id)
    }

    /// Member ids of a room
    pub fn room_members(&self, id: &str) -> GatewayResult<Vec<String>> {
        self.state.rooms().members(id)
    }

    /// Number of rooms
    pub fn room_count(&self) -> usize {
        self.state.rooms().room_count()
    }

    /// Add a live connection to a room
    pub fn join_room(&self, connection_id: &str, room_id: &str) -> GatewayResult<()> {
        let connection = self
            .connection(connection_id)
            .ok_or_else(|| GatewayError::ConnectionNotFound(connection_id.to_string()))?;
        self.state.rooms().join_room(&connection, room_id)
    }

    /// Remove a live connection from a room
    pub fn leave_room(&self, connection_id: &str, room_id: &str) -> GatewayResult<bool> {
        let connection = self
            .connection(connection_id)
            .ok_or_else(|| GatewayError::ConnectionNotFound(connection_id.to_string()))?;
        Ok(self.state.rooms().leave_room(&connection, room_id))
    }

    // Broadcast

    /// Queue `frame` on every live connection, returning how many accepted it
    pub async fn broadcast(&self, frame: Frame) -> GatewayResult<usize> {
        let targets = self.state.connections().snapshot();
        self.fan_out(targets, frame).await
    }

    /// Queue `frame` on every member of a room except `exclude`
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        frame: Frame,
        exclude: Option<&str>,
    ) -> GatewayResult<BroadcastReport> {
        self.state.rooms().broadcast(room_id, frame, exclude).await
    }

    /// Queue `frame` on every connection of one user, returning how many accepted it
    pub async fn broadcast_to_user(&self, user_id: &str, frame: Frame) -> GatewayResult<usize> {
        let targets = self.state.connections().by_user(user_id);
        self.fan_out(targets, frame).await
    }

    async fn fan_out(&self, targets: Vec<Arc<Connection>>, frame: Frame) -> GatewayResult<usize> {
        let config = self.state.config();
        let report = fan_out(targets, frame, config.broadcast_workers, config.broadcast_timeout).await?;
        Ok(report.delivered)
    }

    // Introspection

    /// Event dispatches dropped so far
    pub fn dropped_events(&self) -> u64 {
        self.state.events().dropped_count()
    }

    /// Get a snapshot of gateway counters
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            connections: self.connection_count(),
            max_connections: self.state.connections().max_connections(),
            rooms: self.room_count(),
            dropped_events: self.dropped_events(),
            router_frozen: self.state.router().is_frozen(),
            shutting_down: self.is_shutting_down(),
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("state", &self.state)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
