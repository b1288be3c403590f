//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each accepted socket is split into its sink and stream halves with
//! separate locks: one task may sit in [`recv`](Connection::recv) while
//! another keeps sending.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Source of connection ids; never reset while the process runs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Listens for TCP connections and upgrades them to WebSockets.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds the listener. Use port 0 to let the OS pick one.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|source| TransportError::Bind {
                    addr: addr.to_owned(),
                    source,
                })?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    async fn upgrade(
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<WebSocketConnection, TransportError> {
        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::Upgrade {
                peer,
                reason: e.to_string(),
            }
        })?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "WebSocket upgrade complete");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        Self::upgrade(stream, peer).await
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// One upgraded client socket.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

/// What a received WebSocket message means to the layer above.
enum Inbound {
    Payload(Vec<u8>),
    Closed,
    /// Ping, pong and raw frames; tungstenite answers pings itself.
    Control,
}

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Payload(text.as_bytes().to_vec()),
            Message::Binary(data) => Self::Payload(data.into()),
            Message::Close(_) => Self::Closed,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Self::Control,
        }
    }
}

impl WebSocketConnection {
    fn send_error(&self, e: impl std::fmt::Display) -> TransportError {
        TransportError::Send {
            conn_id: self.id,
            reason: e.to_string(),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// JSON is always valid UTF-8 and goes out as a text frame; any other
    /// payload is sent as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| self.send_error(e))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        while let Some(frame) = stream.next().await {
            let msg = frame.map_err(|e| TransportError::Receive {
                conn_id: self.id,
                reason: e.to_string(),
            })?;
            match Inbound::from(msg) {
                Inbound::Payload(data) => return Ok(Some(data)),
                Inbound::Closed => return Ok(None),
                Inbound::Control => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| self.send_error(e))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
