//! Transport abstraction layer for Stackforge.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying client events, plus the [`ConnectionId`]
//! that identifies a live connection everywhere above this layer.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a connection.
///
/// Assigned by the transport when a socket is accepted and never reused
/// while the process runs. Higher layers use it as the participant
/// identity, so it travels on the wire as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener that hands out [`Connection`]s.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client. A failure concerns that client only;
    /// the transport keeps listening.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// A bidirectional, message-oriented link to one client.
///
/// `send` and `recv` must not serialize against each other: the server
/// parks a reader in `recv` for the whole connection lifetime while a
/// separate writer task keeps calling `send`.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one complete message.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next complete message, or `Ok(None)` once the peer has
    /// closed the link.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Starts a clean close from this side.
    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
