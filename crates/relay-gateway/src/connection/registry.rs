//! Connection registry
//!
//! Tracks all live connections using DashMap for thread-safe access. The live
//! count is kept in a separate atomic so capacity checks never scan the map.

use super::Connection;
use crate::error::{GatewayError, GatewayResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Capacity-bounded set of live connections
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
    count: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a registry admitting at most `max_connections`
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            count: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Register a connection
    ///
    /// A slot is reserved first and released again if the id turns out to be
    /// taken, so the count never runs ahead of the map for long and never
    /// passes the limit.
    pub fn add(&self, connection: Arc<Connection>) -> GatewayResult<()> {
        let max = self.max_connections;
        if self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            return Err(GatewayError::TooManyConnections { max });
        }

        match self.connections.entry(connection.id().to_string()) {
            Entry::Occupied(entry) => {
                self.count.fetch_sub(1, Ordering::SeqCst);
                Err(GatewayError::DuplicateConnection(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                tracing::debug!(connection_id = %connection.id(), "Connection registered");
                entry.insert(connection);
                Ok(())
            }
        }
    }

    /// Deregister by id; unknown ids are ignored
    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(id)?;
        self.count.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(connection_id = %id, "Connection deregistered");
        Some(connection)
    }

    /// Deregister `connection` only if the registered entry is this exact handle
    pub fn remove_handle(&self, connection: &Connection) -> bool {
        let removed = self
            .connections
            .remove_if(connection.id(), |_, registered| {
                std::ptr::eq(registered.as_ref(), connection)
            })
            .is_some();

        if removed {
            self.count.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(connection_id = %connection.id(), "Connection deregistered");
        }
        removed
    }

    /// Look up a connection by id
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if an id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Configured limit
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Check if no further connection would be admitted
    pub fn is_at_capacity(&self) -> bool {
        self.count() >= self.max_connections
    }

    /// Point-in-time copy of all registered handles
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Visit every registered connection
    ///
    /// Iterates a snapshot, so `f` may add or remove connections freely.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        for connection in self.snapshot() {
            f(&connection);
        }
    }

    /// All connections associated with `user_id`
    pub fn by_user(&self, user_id: &str) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().user_id().as_deref() == Some(user_id))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Deregister everything, returning the removed handles
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("count", &self.count())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
