//! Room handlers
//!
//! `join` and `leave` manage the caller's own membership. `say` notifies every
//! other member of a room the caller belongs to.

use crate::connection::Connection;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{Frame, Message};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRequest {
    pub room: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: String,
    pub members: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SayRequest {
    pub room: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SayResponse {
    pub delivered: usize,
}

fn member_count(connection: &Connection, room: &str) -> GatewayResult<usize> {
    let gateway = connection.gateway()?;
    Ok(gateway.rooms().get_room(room).map_or(0, |r| r.member_count()))
}

pub(super) async fn join(connection: Arc<Connection>, request: RoomRequest) -> GatewayResult<RoomResponse> {
    let gateway = connection.gateway()?;
    gateway.rooms().join_room(&connection, &request.room)?;

    tracing::debug!(connection_id = %connection.id(), room_id = %request.room, "Joined room");

    Ok(RoomResponse {
        members: member_count(&connection, &request.room)?,
        room: request.room,
    })
}

pub(super) async fn leave(connection: Arc<Connection>, request: RoomRequest) -> GatewayResult<RoomResponse> {
    let gateway = connection.gateway()?;
    if !gateway.rooms().leave_room(&connection, &request.room) {
        return Err(GatewayError::handler(
            404,
            format!("Not a member of room {}", request.room),
        ));
    }

    Ok(RoomResponse {
        members: member_count(&connection, &request.room)?,
        room: request.room,
    })
}

pub(super) async fn say(connection: Arc<Connection>, request: SayRequest) -> GatewayResult<SayResponse> {
    if !connection.is_in_room(&request.room) {
        return Err(GatewayError::handler(
            403,
            format!("Not a member of room {}", request.room),
        ));
    }

    let notice = Message::notify(
        "message",
        json!({
            "room": request.room,
            "from": connection.id(),
            "user_id": connection.user_id(),
            "text": request.text,
        }),
    );
    let frame = Frame::message(&notice)?;

    let report = connection
        .gateway()?
        .rooms()
        .broadcast(&request.room, frame, Some(connection.id()))
        .await?;

    Ok(SayResponse {
        delivered: report.delivered,
    })
}
