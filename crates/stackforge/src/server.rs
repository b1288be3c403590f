//! `StackforgeServer` builder and accept loop.
//!
//! This is the entry point for running a Stackforge coordinator. It ties
//! together all the layers: transport → protocol → registry → sessions.

use std::sync::Arc;

use stackforge_protocol::{Codec, JsonCodec};
use stackforge_session::DirectoryConfig;
use stackforge_transport::{Transport, WebSocketTransport};

use crate::dispatcher::Dispatcher;
use crate::handler::handle_connection;
use crate::StackforgeError;

/// State shared by every connection task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Stackforge server.
///
/// # Example
///
/// ```rust,no_run
/// use stackforge::prelude::*;
///
/// # async fn start() -> Result<(), StackforgeError> {
/// let server = StackforgeServer::builder()
///     .bind("0.0.0.0:8080")
///     .directory_config(DirectoryConfig { id_length: 8, ..Default::default() })
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct StackforgeServerBuilder {
    bind_addr: String,
    directory_config: DirectoryConfig,
}

impl StackforgeServerBuilder {
    /// Listens on `127.0.0.1:8080` with the default directory settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            directory_config: DirectoryConfig::default(),
        }
    }

    /// `host:port` to listen on. Port 0 picks a free port.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Session id length and actor queue size.
    pub fn directory_config(mut self, config: DirectoryConfig) -> Self {
        self.directory_config = config;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<StackforgeServer<JsonCodec>, StackforgeError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            dispatcher: Dispatcher::new(self.directory_config),
            codec: JsonCodec,
        });

        Ok(StackforgeServer { transport, state })
    }
}

impl Default for StackforgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Stackforge server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct StackforgeServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl StackforgeServer<JsonCodec> {
    pub fn builder() -> StackforgeServerBuilder {
        StackforgeServerBuilder::new()
    }
}

impl<C: Codec> StackforgeServer<C> {
    /// The address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each accepted connection. A failed accept
    /// or WebSocket upgrade is logged and the loop carries on. Runs until
    /// the process is terminated.
    pub async fn run(mut self) -> Result<(), StackforgeError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Stackforge server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
