//! Message router
//!
//! Maps event names to handlers. Until [`Router::freeze`] the middleware chain
//! is composed on every dispatch; freezing composes it once per handler and
//! makes the tables read-only.

use super::handler::{Handler, HandlerResult, TypedHandler};
use super::middleware::{compose, Middleware};
use crate::connection::Connection;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Message;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Event-name dispatch table with a middleware chain
#[derive(Default)]
pub struct Router {
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    compiled: OnceLock<HashMap<String, Arc<dyn Handler>>>,
}

impl Router {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to an event name
    pub fn register<H: Handler>(&self, event: impl Into<String>, handler: H) -> GatewayResult<()> {
        let event = event.into();
        let mut handlers = self.handlers.write();
        if self.is_frozen() {
            return Err(GatewayError::RouterFrozen);
        }

        match handlers.entry(event) {
            Entry::Occupied(entry) => Err(GatewayError::DuplicateHandler(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(event = %entry.key(), "Handler registered");
                entry.insert(Arc::new(handler));
                Ok(())
            }
        }
    }

    /// Bind a handler taking a decoded payload and returning a serializable reply
    ///
    /// A payload that does not decode into `Req` is answered with a 400 error
    /// carrying the request's id; the handler is not invoked.
    pub fn register_typed<Req, Resp, F, Fut>(&self, event: impl Into<String>, f: F) -> GatewayResult<()>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Arc<Connection>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GatewayResult<Resp>> + Send + 'static,
    {
        self.register(event, TypedHandler::new(f))
    }

    /// Append a middleware to the chain
    pub fn use_middleware<M: Middleware>(&self, middleware: M) -> GatewayResult<()> {
        let mut chain = self.middleware.write();
        if self.is_frozen() {
            return Err(GatewayError::RouterFrozen);
        }
        chain.push(Arc::new(middleware));
        Ok(())
    }

    /// Compose every handler with the chain and stop accepting changes
    ///
    /// Idempotent.
    pub fn freeze(&self) {
        let handlers = self.handlers.write();
        let chain = self.middleware.write();
        if self.is_frozen() {
            return;
        }

        let compiled: HashMap<_, _> = handlers
            .iter()
            .map(|(event, handler)| (event.clone(), compose(Arc::clone(handler), &chain)))
            .collect();

        tracing::info!(
            handlers = compiled.len(),
            middleware = chain.len(),
            "Router frozen"
        );
        let _ = self.compiled.set(compiled);
    }

    /// Check if [`Router::freeze`] has run
    pub fn is_frozen(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Check if a handler is bound to `event`
    pub fn has_handler(&self, event: &str) -> bool {
        match self.compiled.get() {
            Some(compiled) => compiled.contains_key(event),
            None => self.handlers.read().contains_key(event),
        }
    }

    fn resolve(&self, event: &str) -> Option<Arc<dyn Handler>> {
        if let Some(compiled) = self.compiled.get() {
            return compiled.get(event).cloned();
        }

        let handler = self.handlers.read().get(event).cloned()?;
        Some(compose(handler, &self.middleware.read()))
    }

    /// Run the composed chain for `message`
    pub async fn route(&self, connection: Arc<Connection>, message: Message) -> HandlerResult {
        let handler = self
            .resolve(&message.event)
            .ok_or_else(|| GatewayError::HandlerNotFound(message.event.clone()))?;
        handler.call(connection, message).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("handlers", &self.handlers.read().len())
            .field("middleware", &self.middleware.read().len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
