//! Message handlers

use crate::connection::Connection;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Message;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Result of handling one message: an optional reply for the sender
pub type HandlerResult = GatewayResult<Option<Message>>;

/// Handles messages for one event name
///
/// Implemented for any `Fn(Arc<Connection>, Message) -> impl Future<Output = HandlerResult>`.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, connection: Arc<Connection>, message: Message) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Arc<Connection>, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, connection: Arc<Connection>, message: Message) -> HandlerResult {
        (self)(connection, message).await
    }
}

/// Adapter decoding `data` into `Req` and encoding the `Resp` as the reply
pub(crate) struct TypedHandler<Req, Resp, F> {
    f: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F> TypedHandler<Req, Resp, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Resp, F, Fut> Handler for TypedHandler<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Arc<Connection>, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GatewayResult<Resp>> + Send + 'static,
{
    async fn call(&self, connection: Arc<Connection>, message: Message) -> HandlerResult {
        let data = message.data.clone().unwrap_or(Value::Null);
        let request: Req = match serde_json::from_value(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    event = %message.event,
                    error = %e,
                    "Payload did not match handler type"
                );
                let err = GatewayError::InvalidMessage(format!("invalid payload: {e}"));
                return Ok(Some(message.error_reply(&err)));
            }
        };

        let response = (self.f)(connection, request).await?;
        let data = serde_json::to_value(response).map_err(GatewayError::internal)?;
        Ok(message.reply(data))
    }
}
