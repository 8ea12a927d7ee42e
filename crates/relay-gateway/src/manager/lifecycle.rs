//! Manager lifecycle: start, connection upgrade and graceful shutdown

use super::Manager;
use crate::connection::{pump, ConnectOptions, Connection};
use crate::error::{ErrorKind, GatewayError, GatewayResult};
use crate::events::{Event, EventType};
use crate::protocol::{CloseCode, Frame, Message};
use crate::transport::Transport;
use futures::future::join_all;
use futures::SinkExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

impl Manager {
    /// Start background work
    ///
    /// Spawns the event workers, freezes the router and launches the periodic
    /// room cleanup. Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.state.events().start();
        self.state.router().freeze();

        let state = Arc::clone(&self.state);
        let cancel = self.lifecycle.child_token();
        let period = state.config().room_cleanup_interval;

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = state.rooms().cleanup();
                        if removed > 0 {
                            tracing::debug!(removed, "Room cleanup pass");
                        }
                    }
                }
            }
            tracing::debug!("Room cleanup stopped");
        });

        tracing::info!(
            max_connections = self.config().max_connections,
            "Gateway started"
        );
    }

    /// Adopt an upgraded socket
    ///
    /// On success the connection is registered, a welcome notification is
    /// queued and both pumps are running. On failure the socket is closed with
    /// a matching close code and the error is returned; a capacity error should
    /// be surfaced to the client as "service unavailable".
    pub async fn handle_upgrade<T: Transport>(
        &self,
        transport: T,
        options: ConnectOptions,
    ) -> GatewayResult<Arc<Connection>> {
        if self.is_shutting_down() {
            self.reject(transport, CloseCode::GoingAway).await;
            return Err(GatewayError::ShuttingDown);
        }

        let (connection, queues) =
            Connection::new(&self.state, options, self.lifecycle.child_token());

        if let Err(err) = self.state.connections().add(Arc::clone(&connection)) {
            connection.discard();
            self.state.metrics().connection_rejected();
            self.state.metrics().error(err.kind());
            tracing::warn!(error = %err, "Connection rejected");

            let code = if err.kind() == ErrorKind::Capacity {
                CloseCode::TryAgainLater
            } else {
                CloseCode::PolicyViolation
            };
            self.reject(transport, code).await;
            return Err(err);
        }

        // Shutdown may have drained the registry between the check and the add.
        if self.is_shutting_down() {
            self.state.connections().remove_handle(&connection);
            connection.discard();
            self.reject(transport, CloseCode::GoingAway).await;
            return Err(GatewayError::ShuttingDown);
        }

        self.state.metrics().connection_opened();
        tracing::info!(
            connection_id = %connection.id(),
            user_id = ?connection.user_id(),
            "Connection established"
        );

        self.state
            .events()
            .publish(Event::new(EventType::Connected, connection.id()))
            .await;

        let welcome = Message::notify(
            "connected",
            serde_json::json!({
                "connection_id": connection.id(),
                "heartbeat_interval_ms": self.config().heartbeat_interval.as_millis() as u64,
            }),
        );
        if let Err(e) = connection.send_message(&welcome) {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Welcome not queued");
        }

        pump::spawn(
            &self.tracker,
            Arc::clone(&connection),
            transport,
            queues,
            Arc::clone(&self.state),
        );

        Ok(connection)
    }

    async fn reject<T: Transport>(&self, mut transport: T, code: CloseCode) {
        let write_timeout = self.config().write_timeout;
        let goodbye = async {
            transport.send(Frame::close(code)).await?;
            transport.close().await
        };
        if let Ok(Err(e)) = timeout(write_timeout, goodbye).await {
            tracing::debug!(error = %e, "Close frame not delivered to rejected socket");
        }
    }

    /// Stop the gateway
    ///
    /// Cancels background work, closes the event bus and closes every
    /// connection concurrently, then waits for all tasks to exit. The
    /// registry is emptied immediately. If `deadline` passes first this returns
    /// [`GatewayError::ShutdownTimeout`] while the remaining cleanup carries on
    /// in the background.
    pub async fn shutdown(&self, deadline: Duration) -> GatewayResult<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let until = Instant::now() + deadline;
        tracing::info!(
            connections = self.connection_count(),
            deadline = ?deadline,
            "Gateway shutting down"
        );

        self.lifecycle.cancel();

        let mut timed_out = false;
        if timeout_at(until, self.state.events().close()).await.is_err() {
            tracing::warn!("Event bus did not stop before the deadline");
            timed_out = true;
        }

        let connections = self.state.connections().drain();
        let closing = tokio::spawn(async move {
            join_all(
                connections
                    .iter()
                    .map(|connection| connection.close_with(CloseCode::GoingAway)),
            )
            .await;
        });

        if timeout_at(until, closing).await.is_err() {
            tracing::warn!("Connections still closing after the deadline");
            timed_out = true;
        }

        self.tracker.close();
        if timeout_at(until, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Background tasks still running after the deadline"
            );
            timed_out = true;
        }

        if timed_out {
            return Err(GatewayError::ShutdownTimeout(deadline));
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
