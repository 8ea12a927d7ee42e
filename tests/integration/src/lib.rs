//! Integration test utilities for the relay gateway
//!
//! This crate provides helpers for running end-to-end tests against the
//! WebSocket endpoint and against a manager over in-memory sockets.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
