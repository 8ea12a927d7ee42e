//! Error types for the real-time core

mod gateway_error;

pub use gateway_error::{ErrorKind, GatewayError, GatewayResult};
