//! System events
//!
//! Lifecycle and message notifications, delivered to subscribers by the
//! [`EventBus`].

mod bus;
mod event_types;

pub use bus::{EventBus, EventHandler};
pub use event_types::{Event, EventType};
