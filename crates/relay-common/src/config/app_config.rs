//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// HTTP listener configuration for the upgrade endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Limits and timings of the real-time core.
///
/// Every field has a default; `validate` must pass before the gateway is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Hard cap on concurrently registered connections
    pub max_connections: usize,
    /// Member capacity applied to rooms created without an explicit one
    pub max_room_members: usize,
    /// Capacity of each connection's normal outbound queue
    pub send_queue_size: usize,
    /// Capacity of each connection's high-priority outbound queue
    pub priority_queue_size: usize,
    /// Largest inbound frame accepted, in bytes
    pub max_message_size: usize,
    /// Interval between server pings
    pub heartbeat_interval: Duration,
    /// Read deadline; a connection silent for this long is dead
    pub heartbeat_timeout: Duration,
    /// Upper bound for a single socket write
    pub write_timeout: Duration,
    /// How long teardown waits for the write loop before closing queues
    pub close_timeout: Duration,
    /// Worker tasks used for one room or global broadcast
    pub broadcast_workers: usize,
    /// Wall-clock deadline of one broadcast
    pub broadcast_timeout: Duration,
    /// Empty rooms older than this are swept
    pub room_idle_ttl: Duration,
    /// Period of the room sweep
    pub room_cleanup_interval: Duration,
    /// Event bus worker tasks
    pub event_workers: usize,
    /// Event bus queue capacity
    pub event_queue_size: usize,
    /// Bounded wait when publishing lifecycle events on a full queue
    pub event_publish_timeout: Duration,
    /// Deadline for a graceful shutdown
    pub shutdown_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_room_members: 1_000,
            send_queue_size: 256,
            priority_queue_size: 64,
            max_message_size: 64 * 1024,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            broadcast_workers: 16,
            broadcast_timeout: Duration::from_secs(5),
            room_idle_ttl: Duration::from_secs(300),
            room_cleanup_interval: Duration::from_secs(60),
            event_workers: 4,
            event_queue_size: 1024,
            event_publish_timeout: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Load gateway settings from `RELAY_*` environment variables.
    ///
    /// Unset variables fall back to the defaults; unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            max_connections: env_or("RELAY_MAX_CONNECTIONS", defaults.max_connections)?,
            max_room_members: env_or("RELAY_MAX_ROOM_MEMBERS", defaults.max_room_members)?,
            send_queue_size: env_or("RELAY_SEND_QUEUE_SIZE", defaults.send_queue_size)?,
            priority_queue_size: env_or("RELAY_PRIORITY_QUEUE_SIZE", defaults.priority_queue_size)?,
            max_message_size: env_or("RELAY_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            heartbeat_interval: env_millis("RELAY_HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval)?,
            heartbeat_timeout: env_millis("RELAY_HEARTBEAT_TIMEOUT_MS", defaults.heartbeat_timeout)?,
            write_timeout: env_millis("RELAY_WRITE_TIMEOUT_MS", defaults.write_timeout)?,
            close_timeout: env_millis("RELAY_CLOSE_TIMEOUT_MS", defaults.close_timeout)?,
            broadcast_workers: env_or("RELAY_BROADCAST_WORKERS", defaults.broadcast_workers)?,
            broadcast_timeout: env_millis("RELAY_BROADCAST_TIMEOUT_MS", defaults.broadcast_timeout)?,
            room_idle_ttl: env_secs("RELAY_ROOM_IDLE_TTL_SECS", defaults.room_idle_ttl)?,
            room_cleanup_interval: env_secs(
                "RELAY_ROOM_CLEANUP_INTERVAL_SECS",
                defaults.room_cleanup_interval,
            )?,
            event_workers: env_or("RELAY_EVENT_WORKERS", defaults.event_workers)?,
            event_queue_size: env_or("RELAY_EVENT_QUEUE_SIZE", defaults.event_queue_size)?,
            event_publish_timeout: env_millis(
                "RELAY_EVENT_PUBLISH_TIMEOUT_MS",
                defaults.event_publish_timeout,
            )?,
            shutdown_timeout: env_millis("RELAY_SHUTDOWN_TIMEOUT_MS", defaults.shutdown_timeout)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("max_connections", self.max_connections),
            ("max_room_members", self.max_room_members),
            ("send_queue_size", self.send_queue_size),
            ("priority_queue_size", self.priority_queue_size),
            ("max_message_size", self.max_message_size),
            ("broadcast_workers", self.broadcast_workers),
            ("event_workers", self.event_workers),
            ("event_queue_size", self.event_queue_size),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name, "must be greater than zero".into()));
            }
        }

        let durations = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("write_timeout", self.write_timeout),
            ("close_timeout", self.close_timeout),
            ("broadcast_timeout", self.broadcast_timeout),
            ("room_idle_ttl", self.room_idle_ttl),
            ("room_cleanup_interval", self.room_cleanup_interval),
            ("event_publish_timeout", self.event_publish_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(name, "must be non-zero".into()));
            }
        }

        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(ConfigError::InvalidValue(
                "heartbeat_timeout",
                format!(
                    "{:?} must exceed heartbeat_interval {:?}",
                    self.heartbeat_timeout, self.heartbeat_interval
                ),
            ));
        }

        Ok(())
    }
}

// Default value functions
fn default_app_name() -> String {
    "relay".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = env_or(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn env_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = env_or(key, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but cannot be parsed, or if the
    /// resulting gateway settings fail validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            server: ServerConfig {
                host: env::var("RELAY_HOST").unwrap_or_else(|_| default_host()),
                port: env_or("RELAY_PORT", default_port())?,
            },
            gateway: GatewayConfig::from_env()?,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
