//! Message routing
//!
//! Dispatches decoded messages to handlers by event name, through an ordered
//! middleware chain.

mod handler;
mod middleware;
#[allow(clippy::module_inception)]
mod router;

pub use handler::{Handler, HandlerResult};
pub use middleware::{Middleware, Next};
pub use router::Router;
