//! Gateway server setup
//!
//! Mounts the WebSocket endpoint and health check on an axum router and runs
//! it until a shutdown signal arrives.

mod handler;

pub use handler::{health_check, ws_handler, ConnectParams};

use crate::handlers;
use crate::manager::Manager;
use axum::{routing::get, Router};
use relay_common::{AppConfig, AppError};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<Arc<Manager>> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
}

/// Build the complete application
pub fn create_app(manager: Arc<Manager>) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

/// Build a started manager with the built-in handlers registered
pub fn create_manager(config: &AppConfig) -> Result<Arc<Manager>, AppError> {
    let manager = Manager::new(config.gateway.clone())?;
    handlers::register_builtin(&manager)?;
    manager.start();
    Ok(Arc::new(manager))
}

/// Serve `manager` on `listener` until `signal` resolves
///
/// Once the signal fires every connection is closed before the listener stops.
pub async fn serve<F>(listener: TcpListener, manager: Arc<Manager>, signal: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let deadline = manager.config().shutdown_timeout;
    let app = create_app(Arc::clone(&manager));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            if let Err(e) = manager.shutdown(deadline).await {
                tracing::warn!(error = %e, "Gateway shutdown incomplete");
            }
        })
        .await
        .map_err(|e| AppError::Server(e.to_string()))
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let manager = create_manager(&config)?;

    let addr = config.server.address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!("Gateway listening on ws://{}/ws", addr);

    serve(listener, manager, shutdown_signal()).await?;

    tracing::info!("Gateway server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
