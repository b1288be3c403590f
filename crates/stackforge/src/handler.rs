//! Per-connection handler: reader loop, writer task, and cleanup.
//!
//! The accept loop spawns one task per connection running
//! [`handle_connection`]:
//!   1. Register the connection and queue `connected`
//!   2. Spawn a writer that drains the connection's mailbox onto the socket
//!   3. Loop: receive frames → decode → dispatch
//!   4. On close, run departure for the connection's session

use std::sync::Arc;

use stackforge_protocol::{ClientEvent, Codec, ConnectionId, ServerEvent};
use stackforge_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::StackforgeError;

/// Runs departure for the connection on every handler exit, panics
/// included. `Drop` cannot await, so the cleanup is spawned.
struct DisconnectGuard<C: Codec> {
    conn_id: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for DisconnectGuard<C> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.dispatcher.disconnect(conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), StackforgeError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (mailbox, inbox) = mpsc::unbounded_channel();
    state.dispatcher.connect(conn_id, &mailbox).await;
    let _guard = DisconnectGuard {
        conn_id,
        state: Arc::clone(&state),
    };

    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        inbox,
        Arc::clone(&state),
    ));

    let result = read_loop(&conn, &state, &mailbox).await;

    // The socket is done; anything still queued has nowhere to go.
    writer.abort();
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close after read loop");
    }
    result
}

async fn read_loop<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    mailbox: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), StackforgeError> {
    let conn_id = conn.id();
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let event: ClientEvent = match state.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode event");
                continue;
            }
        };

        state.dispatcher.handle(conn_id, mailbox, event).await;
    }
}

/// Encodes queued events and writes them to the socket, in order.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut inbox: mpsc::UnboundedReceiver<ServerEvent>,
    state: Arc<ServerState<C>>,
) {
    let conn_id = conn.id();
    while let Some(event) = inbox.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}
