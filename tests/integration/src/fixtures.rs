//! Test fixtures and data generators
//!
//! Provides gateway configurations and unique names for integration tests.

use relay_common::GatewayConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Unique room id
pub fn unique_room() -> String {
    format!("room-{}", unique_suffix())
}

/// Gateway configuration with short timers for tests
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        max_connections: 64,
        max_room_members: 16,
        send_queue_size: 32,
        priority_queue_size: 8,
        close_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_secs(1),
        broadcast_timeout: Duration::from_secs(1),
        shutdown_timeout: Duration::from_secs(2),
        ..GatewayConfig::default()
    }
}

/// Test configuration with a connection cap
pub fn capped_config(max_connections: usize) -> GatewayConfig {
    GatewayConfig {
        max_connections,
        ..test_config()
    }
}

/// Test configuration with fast heartbeats
pub fn fast_heartbeat_config() -> GatewayConfig {
    GatewayConfig {
        heartbeat_interval: Duration::from_millis(20),
        heartbeat_timeout: Duration::from_millis(60),
        ..test_config()
    }
}
