//! Echo handler

use crate::connection::Connection;
use crate::error::GatewayResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub text: String,
}

/// Reply with the request's text
pub(super) async fn handle(_connection: Arc<Connection>, request: EchoRequest) -> GatewayResult<EchoResponse> {
    Ok(EchoResponse { text: request.text })
}
