//! # relay-gateway
//!
//! Real-time connection and messaging core. Accepts persistent bidirectional
//! connections, routes JSON requests to handlers by event name, tracks room
//! membership and fans broadcasts out under connection, queue and room limits.
//!
//! ```no_run
//! use relay_gateway::{handlers, server, Manager};
//! use relay_common::GatewayConfig;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Manager::new(GatewayConfig::default())?;
//! handlers::register_builtin(&manager)?;
//! manager.start();
//!
//! let app = server::create_app(Arc::new(manager));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod events;
pub mod handlers;
pub mod manager;
pub mod metrics;
pub mod protocol;
pub mod room;
pub mod router;
pub mod server;
pub mod transport;

pub use connection::{ConnectOptions, Connection, ConnectionInfo};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use events::{Event, EventType};
pub use manager::{GatewayStats, Manager};
pub use protocol::{CloseCode, Frame, Message, MessageType};
pub use room::{RoomInfo, RoomOptions};
pub use router::{Handler, Middleware, Next};
pub use server::run;
