//! Bounded broadcast fan-out
//!
//! Delivers one frame to many connections using a fixed number of worker tasks
//! pulling from a shared work queue, under one overall deadline.

use crate::connection::Connection;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Frame;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a completed broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Connections targeted
    pub targets: usize,
    /// Frames queued successfully
    pub delivered: usize,
    /// Frames refused (queue full or connection closed)
    pub failed: usize,
}

/// Queue `frame` on every target
///
/// At most `workers` tasks run regardless of the number of targets. If
/// `deadline` passes first the remaining work is abandoned and
/// [`GatewayError::BroadcastTimeout`] is returned; frames already queued stay
/// queued.
pub async fn fan_out(
    targets: Vec<Arc<Connection>>,
    frame: Frame,
    workers: usize,
    deadline: Duration,
) -> GatewayResult<BroadcastReport> {
    let total = targets.len();
    if total == 0 {
        return Ok(BroadcastReport::default());
    }

    let queue = Arc::new(Mutex::new(targets.into_iter()));
    let frame = Arc::new(frame);
    let delivered = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..workers.clamp(1, total))
        .map(|_| {
            let queue = Arc::clone(&queue);
            let frame = Arc::clone(&frame);
            let delivered = Arc::clone(&delivered);
            let failed = Arc::clone(&failed);

            tokio::spawn(async move {
                loop {
                    let next = queue.lock().next();
                    let Some(connection) = next else { break };

                    match connection.send(Frame::clone(&frame)) {
                        Ok(()) => {
                            delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                connection_id = %connection.id(),
                                error = %e,
                                "Broadcast delivery failed"
                            );
                        }
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let aborts: Vec<_> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();

    if tokio::time::timeout(deadline, join_all(handles)).await.is_err() {
        for abort in aborts {
            abort.abort();
        }
        tracing::warn!(
            targets = total,
            delivered = delivered.load(Ordering::Relaxed),
            timeout = ?deadline,
            "Broadcast timed out"
        );
        return Err(GatewayError::BroadcastTimeout(deadline));
    }

    let report = BroadcastReport {
        targets: total,
        delivered: delivered.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    };

    if report.failed > 0 {
        tracing::warn!(
            targets = report.targets,
            failed = report.failed,
            "Broadcast partially delivered"
        );
    }
    Ok(report)
}
