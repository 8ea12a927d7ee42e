//! Event bus
//!
//! Fire-and-forget fan-out of [`Event`]s to subscribers on a fixed worker pool.
//! Publishing never blocks the data path for long: lifecycle events wait at
//! most `publish_timeout` for queue space, everything else is dropped at once
//! when the queue is full.

use super::{Event, EventType};
use crate::metrics::MetricsSink;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use relay_common::GatewayConfig;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Subscriber callback
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Job {
    handler: EventHandler,
    event: Arc<Event>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

/// Asynchronous event dispatcher
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<EventHandler>>>,
    sender: mpsc::Sender<Job>,
    receiver: SharedReceiver,
    workers: usize,
    publish_timeout: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
    dropped: AtomicU64,
    metrics: Arc<dyn MetricsSink>,
}

impl EventBus {
    /// Create a bus; workers are not spawned until [`EventBus::start`]
    #[must_use]
    pub fn new(
        workers: usize,
        queue_size: usize,
        publish_timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        Self {
            subscribers: RwLock::new(HashMap::new()),
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            workers: workers.max(1),
            publish_timeout,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            dropped: AtomicU64::new(0),
            metrics,
        }
    }

    /// Create a bus sized from the gateway configuration
    #[must_use]
    pub fn from_config(config: &GatewayConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self::new(
            config.event_workers,
            config.event_queue_size,
            config.event_publish_timeout,
            metrics,
        )
    }

    /// Register a subscriber for one event type
    pub fn subscribe<F>(&self, kind: EventType, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of subscribers registered for `kind`
    #[must_use]
    pub fn subscriber_count(&self, kind: EventType) -> usize {
        self.subscribers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Spawn the worker pool. Calling it again is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Event bus is already running");
            return;
        }

        let mut handles = self.handles.lock();
        for worker in 0..self.workers {
            let receiver = Arc::clone(&self.receiver);
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(run_worker(worker, receiver, cancel)));
        }

        tracing::info!(workers = self.workers, "Event bus started");
    }

    /// Queue one dispatch per subscriber of the event's type
    pub async fn publish(&self, event: Event) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let handlers = match self.subscribers.read().get(&event.kind) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => return,
        };

        let event = Arc::new(event);
        for handler in handlers {
            let job = Job {
                handler,
                event: Arc::clone(&event),
            };

            let queued = if event.kind.is_lifecycle() {
                self.sender
                    .send_timeout(job, self.publish_timeout)
                    .await
                    .is_ok()
            } else {
                self.sender.try_send(job).is_ok()
            };

            if !queued {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.event_dropped();
                tracing::warn!(
                    event = %event.kind,
                    connection_id = %event.connection_id,
                    "Event queue full, dropping event"
                );
            }
        }
    }

    /// Total dispatches dropped because the queue was full
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether [`EventBus::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting events and wait for every worker to exit
    ///
    /// Jobs still queued are discarded. The queue itself stays open so a
    /// concurrent publish never writes into a closed channel.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        join_all(handles).await;

        tracing::info!(dropped = self.dropped_count(), "Event bus closed");
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("workers", &self.workers)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("dropped", &self.dropped_count())
            .finish_non_exhaustive()
    }
}

async fn run_worker(worker: usize, receiver: SharedReceiver, cancel: CancellationToken) {
    loop {
        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };

        let Some(job) = job else { break };

        let Job { handler, event } = job;
        if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
            tracing::error!(
                worker,
                event = %event.kind,
                connection_id = %event.connection_id,
                "Event subscriber panicked"
            );
        }
    }

    tracing::debug!(worker, "Event worker stopped");
}
