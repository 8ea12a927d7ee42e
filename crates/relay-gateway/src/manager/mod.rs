//! Gateway manager
//!
//! Ties the registries, router and event bus together and runs the gateway
//! lifecycle.

mod lifecycle;
#[allow(clippy::module_inception)]
mod manager;
mod state;

pub use manager::{GatewayStats, Manager};
pub use state::GatewayState;
