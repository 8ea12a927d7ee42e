//! Test helpers for integration tests
//!
//! Provides a gateway server bound to an ephemeral port, a WebSocket client
//! speaking the JSON envelope, and an in-memory client for driving a
//! [`Manager`] directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures::{SinkExt, StreamExt};
use relay_common::GatewayConfig;
use relay_gateway::transport::{memory_pair, MemorySocket};
use relay_gateway::{handlers, server, ConnectOptions, Connection, Frame, Manager, Message};
use reqwest::{Client, Response};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long a helper waits for any single frame
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Build a started manager with the built-in handlers registered
pub fn started_manager(config: GatewayConfig) -> Result<Arc<Manager>> {
    let manager = Manager::new(config)?;
    handlers::register_builtin(&manager)?;
    manager.start();
    Ok(Arc::new(manager))
}

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub manager: Arc<Manager>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with the test configuration
    pub async fn start() -> Result<Self> {
        Self::start_with_config(crate::fixtures::test_config()).await
    }

    /// Start a test server with custom config
    pub async fn start_with_config(config: GatewayConfig) -> Result<Self> {
        let manager = started_manager(config)?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel::<()>();
        let serving = Arc::clone(&manager);
        let handle = tokio::spawn(async move {
            let signal = async move {
                rx.await.ok();
            };
            server::serve(listener, serving, signal).await.ok();
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            client,
            manager,
            shutdown: Some(tx),
            handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL, with an optional query string
    pub fn ws_url(&self, query: Option<&str>) -> String {
        match query {
            Some(query) => format!("ws://{}/ws?{query}", self.addr),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Open a WebSocket and consume the welcome notification
    pub async fn connect(&self) -> Result<WsClient> {
        WsClient::connect(&self.ws_url(None)).await
    }

    /// Open a WebSocket for `user_id`
    pub async fn connect_as(&self, user_id: &str) -> Result<WsClient> {
        WsClient::connect(&self.ws_url(Some(&format!("user_id={user_id}")))).await
    }

    /// Trigger graceful shutdown and wait for the server task
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        tokio::time::timeout(Duration::from_secs(15), &mut self.handle).await??;
        Ok(())
    }
}

/// JSON-envelope WebSocket client
pub struct WsClient {
    pub connection_id: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect and wait for the `connected` notification
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(url).await?;
        let mut client = Self {
            connection_id: String::new(),
            stream,
        };

        let welcome = client.recv().await?;
        if welcome.event != "connected" {
            bail!("expected welcome, got {welcome}");
        }
        client.connection_id = welcome
            .data
            .as_ref()
            .and_then(|d| d["connection_id"].as_str())
            .ok_or_else(|| anyhow!("welcome without connection_id"))?
            .to_string();

        Ok(client)
    }

    /// Send a raw text frame
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.stream.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    /// Send a request envelope
    pub async fn request(&mut self, event: &str, request_id: &str, data: Value) -> Result<()> {
        let message = Message::request(event, request_id, data);
        self.send_text(message.to_json()?).await
    }

    /// Send a request and wait for the reply carrying its id
    pub async fn call(&mut self, event: &str, request_id: &str, data: Value) -> Result<Message> {
        self.request(event, request_id, data).await?;
        loop {
            let message = self.recv().await?;
            if message.request_id.as_deref() == Some(request_id) {
                return Ok(message);
            }
        }
    }

    /// Next decoded message, skipping control frames
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for message"))?
                .ok_or_else(|| anyhow!("socket closed"))??;

            match frame {
                WsMessage::Text(text) => return Ok(Message::from_json(&text)?),
                WsMessage::Binary(data) => return Ok(Message::decode(&data)?),
                WsMessage::Close(close) => bail!("socket closed: {close:?}"),
                _ => {}
            }
        }
    }

    /// Wait for the close frame and return its code
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for close"))?;

            match frame {
                Some(Ok(WsMessage::Close(close))) => return Ok(close.map(|c| u16::from(c.code))),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Close the socket from the client side
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

/// In-memory client attached to a manager
pub struct MemoryClient {
    pub connection: Arc<Connection>,
    socket: MemorySocket,
}

impl MemoryClient {
    /// Upgrade an in-memory socket and consume the welcome notification
    pub async fn connect(manager: &Manager) -> Result<Self> {
        Self::connect_with(manager, ConnectOptions::new()).await
    }

    /// Same as [`MemoryClient::connect`] with explicit options
    pub async fn connect_with(manager: &Manager, options: ConnectOptions) -> Result<Self> {
        let (server, socket) = memory_pair();
        let connection = manager.handle_upgrade(server, options).await?;
        let mut client = Self { connection, socket };

        let welcome = client.recv().await?;
        if welcome.event != "connected" {
            bail!("expected welcome, got {welcome}");
        }
        Ok(client)
    }

    /// Connection id assigned by the gateway
    pub fn id(&self) -> &str {
        self.connection.id()
    }

    /// Send a raw frame
    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        self.socket.send(frame).await?;
        Ok(())
    }

    /// Send a request envelope
    pub async fn request(&mut self, event: &str, request_id: &str, data: Value) -> Result<()> {
        let message = Message::request(event, request_id, data);
        self.send(Frame::Text(message.to_json()?)).await
    }

    /// Next frame of any kind
    pub async fn next_frame(&mut self) -> Result<Frame> {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.socket.next())
            .await
            .map_err(|_| anyhow!("timed out waiting for frame"))?
            .ok_or_else(|| anyhow!("socket closed"))??;
        Ok(frame)
    }

    /// Next decoded message, skipping control frames
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            match self.next_frame().await? {
                Frame::Close(close) => bail!("socket closed: {close:?}"),
                frame => {
                    if let Some(data) = frame.as_data() {
                        return Ok(Message::decode(data)?);
                    }
                }
            }
        }
    }

    /// Wait for the close frame and return its code
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            if let Frame::Close(close) = self.next_frame().await? {
                return Ok(close.map(|c| c.code));
            }
        }
    }

    /// Check that nothing arrives within `wait`
    pub async fn expect_silence(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.socket.next()).await.is_err()
    }
}
