//! Connection management
//!
//! Handles live socket sessions, their outbound queues and the registry that
//! tracks them.

#[allow(clippy::module_inception)]
mod connection;
mod options;
pub(crate) mod pump;
mod registry;

pub use connection::{Connection, ConnectionInfo, OutboundQueues};
pub use options::ConnectOptions;
pub use registry::ConnectionRegistry;
