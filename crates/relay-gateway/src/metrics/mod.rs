//! Metrics sink
//!
//! The core reports counters through [`MetricsSink`]; exporting them is left to
//! the hosting application. [`NoopMetrics`] is the default.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives counters from the core
///
/// Every method has an empty default so implementations only override what
/// they export.
pub trait MetricsSink: Send + Sync {
    /// A connection was registered
    fn connection_opened(&self) {}

    /// A registered connection finished teardown
    fn connection_closed(&self) {}

    /// An upgrade was rejected before registration
    fn connection_rejected(&self) {}

    /// An inbound data frame was decoded
    fn message_received(&self, _bytes: usize) {}

    /// An outbound frame was written to a socket
    fn message_sent(&self, _bytes: usize) {}

    /// An outbound frame was refused by a full or closed queue
    fn message_dropped(&self) {}

    /// An event could not be queued for dispatch
    fn event_dropped(&self) {}

    /// An error surfaced to a client or caller
    fn error(&self, _kind: ErrorKind) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// In-process counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    connections_rejected: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_dropped: AtomicU64,
    events_dropped: AtomicU64,
    errors: AtomicU64,
}

impl AtomicMetrics {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for AtomicMetrics {
    fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn message_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn message_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn error(&self, kind: ErrorKind) {
        tracing::trace!(kind = %kind, "Error recorded");
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_rejected: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_dropped: u64,
    pub events_dropped: u64,
    pub errors: u64,
}
