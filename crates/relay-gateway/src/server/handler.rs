//! HTTP handlers
//!
//! The WebSocket upgrade endpoint and the health check.

use crate::connection::ConnectOptions;
use crate::manager::{GatewayStats, Manager};
use crate::transport::AxumSocket;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_common::{AppError, ErrorResponse};
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters accepted on `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler
///
/// Refuses the upgrade with 503 while the gateway is full or stopping. A
/// connection that loses the capacity race after upgrading is closed with
/// code 1013 instead.
pub async fn ws_handler(
    State(manager): State<Arc<Manager>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if manager.is_shutting_down() {
        return unavailable("gateway is shutting down");
    }
    if manager.is_at_capacity() {
        return unavailable("connection limit reached");
    }

    let mut options = ConnectOptions::new();
    if let Some(user_id) = params.user_id {
        options = options.with_user_id(user_id);
    }

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = manager.handle_upgrade(AxumSocket::new(socket), options).await {
            tracing::warn!(error = %e, "WebSocket connection refused");
        }
    })
}

fn unavailable(reason: &str) -> Response {
    let body = ErrorResponse::from(AppError::unavailable(reason));
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

/// Health check endpoint
pub async fn health_check(State(manager): State<Arc<Manager>>) -> Json<GatewayStats> {
    Json(manager.stats())
}
