//! Gateway state
//!
//! The registries, router, event bus and metrics sink of one gateway. Owned by
//! the [`Manager`](super::Manager) and shared with every connection.

use crate::connection::ConnectionRegistry;
use crate::events::EventBus;
use crate::metrics::MetricsSink;
use crate::room::RoomRegistry;
use crate::router::Router;
use relay_common::GatewayConfig;
use std::sync::Arc;

/// Shared gateway components
pub struct GatewayState {
    config: GatewayConfig,
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    router: Router,
    events: EventBus,
    metrics: Arc<dyn MetricsSink>,
}

impl GatewayState {
    /// Build all components from `config`
    ///
    /// The configuration is taken as-is; callers validate it first.
    pub fn new(config: GatewayConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            connections: ConnectionRegistry::new(config.max_connections),
            rooms: RoomRegistry::new(&config),
            router: Router::new(),
            events: EventBus::from_config(&config, Arc::clone(&metrics)),
            metrics,
            config,
        }
    }

    /// Create a new gateway state wrapped in Arc
    pub fn new_shared(config: GatewayConfig, metrics: Arc<dyn MetricsSink>) -> Arc<Self> {
        Arc::new(Self::new(config, metrics))
    }

    /// Get the gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the connection registry
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Get the room registry
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Get the message router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Get the event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Get the metrics sink
    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("connections", &self.connections)
            .field("rooms", &self.rooms)
            .field("router", &self.router)
            .field("events", &self.events)
            .finish()
    }
}
