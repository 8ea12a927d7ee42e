//! Room registry
//!
//! Manages all rooms using DashMap. Rooms are created explicitly or lazily on
//! first join, and idle empty rooms are removed by [`RoomRegistry::cleanup`].

use super::{Room, RoomInfo, RoomOptions};
use crate::broadcast::{fan_out, BroadcastReport};
use crate::connection::Connection;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Frame;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_common::GatewayConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// All rooms of one gateway
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    room_count: AtomicUsize,
    default_capacity: usize,
    broadcast_workers: usize,
    broadcast_timeout: Duration,
    idle_ttl: Duration,
}

impl RoomRegistry {
    /// Create an empty registry configured from `config`
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            room_count: AtomicUsize::new(0),
            default_capacity: config.max_room_members,
            broadcast_workers: config.broadcast_workers,
            broadcast_timeout: config.broadcast_timeout,
            idle_ttl: config.room_idle_ttl,
        }
    }

    /// Create a room; fails if the id is taken
    pub fn create_room(&self, id: impl Into<String>, options: RoomOptions) -> GatewayResult<Arc<Room>> {
        let id = id.into();
        match self.rooms.entry(id.clone()) {
            Entry::Occupied(_) => Err(GatewayError::RoomExists(id)),
            Entry::Vacant(entry) => {
                let capacity = options.capacity.unwrap_or(self.default_capacity);
                let room = Arc::new(Room::new(id.clone(), capacity, options.metadata));
                entry.insert(Arc::clone(&room));
                self.room_count.fetch_add(1, Ordering::SeqCst);

                tracing::info!(room_id = %id, capacity, "Room created");
                Ok(room)
            }
        }
    }

    /// Look up a room
    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Delete a room, evicting its members
    pub fn delete_room(&self, id: &str) -> GatewayResult<()> {
        let (_, room) = self
            .rooms
            .remove(id)
            .ok_or_else(|| GatewayError::RoomNotFound(id.to_string()))?;
        self.room_count.fetch_sub(1, Ordering::SeqCst);

        let evicted = room.evict_all();
        for connection in &evicted {
            connection.forget_room(id);
        }

        tracing::info!(room_id = %id, evicted = evicted.len(), "Room deleted");
        Ok(())
    }

    /// Add `connection` to a room, creating the room if needed
    ///
    /// The registry entry is held while joining so a concurrent cleanup cannot
    /// drop the room from under the new member.
    pub fn join_room(&self, connection: &Arc<Connection>, room_id: &str) -> GatewayResult<()> {
        if connection.is_closed() {
            return Err(GatewayError::ConnectionClosed);
        }

        {
            let room = match self.rooms.get(room_id) {
                Some(room) => room,
                None => self
                    .rooms
                    .entry(room_id.to_string())
                    .or_insert_with(|| {
                        self.room_count.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!(room_id = %room_id, "Room created on first join");
                        Arc::new(Room::new(room_id, self.default_capacity, HashMap::new()))
                    })
                    .downgrade(),
            };

            room.join(connection)?;
            connection.remember_room(room_id);
        }

        // Teardown may have drained the room list just before we recorded it.
        if connection.is_closed() {
            self.leave_room(connection, room_id);
            return Err(GatewayError::ConnectionClosed);
        }

        tracing::debug!(connection_id = %connection.id(), room_id = %room_id, "Joined room");
        Ok(())
    }

    /// Remove `connection` from a room; unknown combinations are a no-op
    pub fn leave_room(&self, connection: &Connection, room_id: &str) -> bool {
        connection.forget_room(room_id);

        let left = self
            .rooms
            .get(room_id)
            .is_some_and(|room| room.leave(connection.id()));

        if left {
            tracing::debug!(connection_id = %connection.id(), room_id = %room_id, "Left room");
        }
        left
    }

    /// Member ids of a room
    pub fn members(&self, room_id: &str) -> GatewayResult<Vec<String>> {
        self.get_room(room_id)
            .map(|room| room.member_ids())
            .ok_or_else(|| GatewayError::RoomNotFound(room_id.to_string()))
    }

    /// Snapshot of a room
    pub fn info(&self, room_id: &str) -> Option<RoomInfo> {
        self.rooms.get(room_id).map(|room| room.info())
    }

    /// Number of rooms
    pub fn room_count(&self) -> usize {
        self.room_count.load(Ordering::SeqCst)
    }

    /// Queue `frame` on every member of a room except `exclude`
    pub async fn broadcast(
        &self,
        room_id: &str,
        frame: Frame,
        exclude: Option<&str>,
    ) -> GatewayResult<BroadcastReport> {
        let room = self
            .get_room(room_id)
            .ok_or_else(|| GatewayError::RoomNotFound(room_id.to_string()))?;
        let targets = room.members_excluding(exclude);

        tracing::trace!(room_id = %room_id, targets = targets.len(), "Broadcasting to room");
        fan_out(targets, frame, self.broadcast_workers, self.broadcast_timeout).await
    }

    /// Remove rooms that have been empty for longer than the idle TTL
    pub fn cleanup(&self) -> usize {
        let ttl = self.idle_ttl;
        let candidates: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().is_idle(ttl))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in candidates {
            if self.rooms.remove_if(&id, |_, room| room.is_idle(ttl)).is_some() {
                self.room_count.fetch_sub(1, Ordering::SeqCst);
                removed += 1;
                tracing::debug!(room_id = %id, "Idle room removed");
            }
        }
        removed
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("room_count", &self.room_count())
            .field("default_capacity", &self.default_capacity)
            .finish()
    }
}
