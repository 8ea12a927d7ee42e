//! Broadcast delivery

mod fanout;

pub use fanout::{fan_out, BroadcastReport};
