//! A single room

use crate::connection::Connection;
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Options for explicitly created rooms
#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    /// Member limit; the registry default when `None`
    pub capacity: Option<usize>,
    pub metadata: HashMap<String, Value>,
}

impl RoomOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named broadcast group with a member limit
pub struct Room {
    id: String,
    capacity: usize,
    members: DashMap<String, Arc<Connection>>,
    member_count: AtomicUsize,
    metadata: RwLock<HashMap<String, Value>>,
    created_at: DateTime<Utc>,
    /// Set while the room has no members
    empty_since: Mutex<Option<Instant>>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: impl Into<String>, capacity: usize, metadata: HashMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            capacity,
            members: DashMap::new(),
            member_count: AtomicUsize::new(0),
            metadata: RwLock::new(metadata),
            created_at: Utc::now(),
            empty_since: Mutex::new(Some(Instant::now())),
        }
    }

    /// Get the room id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the member limit
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.member_count.load(Ordering::SeqCst)
    }

    /// Add a member
    ///
    /// Reserves a slot before touching the member set and gives it back if the
    /// connection is already a member.
    pub fn join(&self, connection: &Arc<Connection>) -> GatewayResult<()> {
        let capacity = self.capacity;
        if self
            .member_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_err()
        {
            return Err(GatewayError::RoomFull {
                room_id: self.id.clone(),
                capacity,
            });
        }

        match self.members.entry(connection.id().to_string()) {
            Entry::Occupied(_) => {
                self.member_count.fetch_sub(1, Ordering::SeqCst);
                Err(GatewayError::AlreadyInRoom {
                    room_id: self.id.clone(),
                    connection_id: connection.id().to_string(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(connection));
                *self.empty_since.lock() = None;
                Ok(())
            }
        }
    }

    /// Remove a member; returns false if it was not a member
    pub fn leave(&self, connection_id: &str) -> bool {
        if self.members.remove(connection_id).is_none() {
            return false;
        }

        if self.member_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            *self.empty_since.lock() = Some(Instant::now());
        }
        true
    }

    /// Check membership
    pub fn contains(&self, connection_id: &str) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Ids of current members
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of member handles, optionally leaving one out
    pub fn members_excluding(&self, exclude: Option<&str>) -> Vec<Arc<Connection>> {
        self.members
            .iter()
            .filter(|entry| Some(entry.key().as_str()) != exclude)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Remove every member, returning their handles
    pub(crate) fn evict_all(&self) -> Vec<Arc<Connection>> {
        let ids = self.member_ids();
        ids.iter()
            .filter_map(|id| {
                let (_, connection) = self.members.remove(id)?;
                self.member_count.fetch_sub(1, Ordering::SeqCst);
                Some(connection)
            })
            .collect()
    }

    /// Whether the room has been empty for at least `ttl`
    pub fn is_idle(&self, ttl: Duration) -> bool {
        if self.member_count() > 0 {
            return false;
        }
        self.empty_since
            .lock()
            .is_some_and(|since| since.elapsed() >= ttl)
    }

    /// Read one metadata entry
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.read().get(key).cloned()
    }

    /// Set one metadata entry
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Get a serializable snapshot
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            member_count: self.member_count(),
            capacity: self.capacity,
            created_at: self.created_at,
            age_secs: (Utc::now() - self.created_at).num_seconds().max(0) as u64,
            metadata: self.metadata.read().clone(),
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("member_count", &self.member_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Room snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub id: String,
    pub member_count: usize,
    pub capacity: usize,
    pub created_at: DateTime<Utc>,
    pub age_secs: u64,
    pub metadata: HashMap<String, Value>,
}
