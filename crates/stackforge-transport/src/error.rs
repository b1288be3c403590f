use std::net::SocketAddr;

use crate::ConnectionId;

/// Errors raised by the transport layer.
///
/// Failures from the WebSocket library are flattened to their message so
/// this type stays the same with or without the `websocket` feature.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The peer connected but the WebSocket upgrade did not complete.
    #[error("WebSocket upgrade from {peer} failed: {reason}")]
    Upgrade { peer: SocketAddr, reason: String },

    /// Writing a frame failed; the connection is unusable.
    #[error("{conn_id}: send failed: {reason}")]
    Send { conn_id: ConnectionId, reason: String },

    /// Reading a frame failed; the connection is unusable.
    #[error("{conn_id}: receive failed: {reason}")]
    Receive { conn_id: ConnectionId, reason: String },
}
