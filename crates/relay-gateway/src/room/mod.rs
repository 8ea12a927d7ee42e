//! Rooms
//!
//! Named broadcast groups with a member limit.

mod registry;
#[allow(clippy::module_inception)]
mod room;

pub use registry::RoomRegistry;
pub use room::{Room, RoomInfo, RoomOptions};
