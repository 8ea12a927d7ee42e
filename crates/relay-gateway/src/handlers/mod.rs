//! Built-in event handlers
//!
//! Registered by the gateway binary: `echo` plus the `join`, `leave` and
//! `say` room handlers.

mod echo;
mod rooms;

pub use echo::{EchoRequest, EchoResponse};
pub use rooms::{RoomRequest, RoomResponse, SayRequest, SayResponse};

use crate::error::GatewayResult;
use crate::manager::Manager;

/// Register every built-in handler on `manager`
///
/// Must run before [`Manager::start`] freezes the router.
pub fn register_builtin(manager: &Manager) -> GatewayResult<()> {
    manager.register_typed("echo", echo::handle)?;
    manager.register_typed("join", rooms::join)?;
    manager.register_typed("leave", rooms::leave)?;
    manager.register_typed("say", rooms::say)?;

    tracing::debug!("Built-in handlers registered");
    Ok(())
}
