//! Middleware chain

use super::handler::{Handler, HandlerResult};
use crate::connection::Connection;
use crate::protocol::Message;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Wraps handler invocation
///
/// A middleware continues the chain by calling [`Next::run`]; returning
/// without calling it short-circuits every later link and the handler.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, connection: Arc<Connection>, message: Message, next: Next) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(Arc<Connection>, Message, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, connection: Arc<Connection>, message: Message, next: Next) -> HandlerResult {
        (self)(connection, message, next).await
    }
}

/// The rest of the chain
#[derive(Clone)]
pub struct Next {
    inner: Arc<dyn Handler>,
}

impl Next {
    /// Continue with the next middleware or the handler
    pub async fn run(self, connection: Arc<Connection>, message: Message) -> HandlerResult {
        self.inner.call(connection, message).await
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

struct Wrapped {
    middleware: Arc<dyn Middleware>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Wrapped {
    async fn call(&self, connection: Arc<Connection>, message: Message) -> HandlerResult {
        let next = Next {
            inner: Arc::clone(&self.next),
        };
        self.middleware.handle(connection, message, next).await
    }
}

/// Wrap `handler` in `chain`, the first middleware being outermost
pub(crate) fn compose(handler: Arc<dyn Handler>, chain: &[Arc<dyn Middleware>]) -> Arc<dyn Handler> {
    chain.iter().rev().fold(handler, |next, middleware| {
        Arc::new(Wrapped {
            middleware: Arc::clone(middleware),
            next,
        })
    })
}
