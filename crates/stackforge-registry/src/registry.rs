//! The connection registry: which connections are live, and where they are.
//!
//! # Concurrency note
//!
//! `ConnectionRegistry` is a plain `HashMap` and is not thread-safe by
//! itself. The dispatcher owns one behind a mutex and holds the lock only
//! for the duration of a single lookup or update, never across an await on
//! session state.

use std::collections::HashMap;

use stackforge_protocol::{ConnectionId, SessionId};

use crate::RegistryError;

/// Tracks live connections and their membership in at most one session.
///
/// ```text
/// register() ──→ bind() ──→ unbind() ──→ unregister()
///                   │                        ▲
///                   └────────────────────────┘
///            (abrupt close: unregister returns the bound session)
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Every live connection. `None` means connected but not in a session.
    connections: HashMap<ConnectionId, Option<SessionId>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly opened connection. Re-registering a live connection
    /// keeps its current membership.
    pub fn register(&mut self, conn_id: ConnectionId) {
        self.connections.entry(conn_id).or_insert(None);
        tracing::debug!(%conn_id, live = self.connections.len(), "connection registered");
    }

    /// Forgets a connection and returns the session it belonged to, so the
    /// caller can run departure handling for it.
    ///
    /// Idempotent: unregistering an unknown connection returns `None`.
    pub fn unregister(&mut self, conn_id: ConnectionId) -> Option<SessionId> {
        let session = self.connections.remove(&conn_id).flatten();
        tracing::debug!(
            %conn_id,
            session = ?session.as_ref().map(SessionId::as_str),
            "connection unregistered"
        );
        session
    }

    /// Returns the session a connection currently belongs to.
    pub fn session_of(&self, conn_id: ConnectionId) -> Option<SessionId> {
        self.connections.get(&conn_id).cloned().flatten()
    }

    /// Records that a connection joined (or created) a session.
    ///
    /// Binding to the session it is already in is a no-op.
    ///
    /// # Errors
    /// - [`RegistryError::UnknownConnection`] if never registered
    /// - [`RegistryError::AlreadyInSession`] if bound elsewhere
    pub fn bind(
        &mut self,
        conn_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<(), RegistryError> {
        let slot = self
            .connections
            .get_mut(&conn_id)
            .ok_or(RegistryError::UnknownConnection(conn_id))?;

        if let Some(current) = slot.as_ref() {
            if *current != session_id {
                return Err(RegistryError::AlreadyInSession(
                    conn_id,
                    current.clone(),
                ));
            }
        }
        *slot = Some(session_id);
        Ok(())
    }

    /// Fails if the connection is already bound to any session.
    ///
    /// Used before creating or joining, so no session is touched for a
    /// request that would be rejected anyway.
    pub fn ensure_unbound(&self, conn_id: ConnectionId) -> Result<(), RegistryError> {
        match self.connections.get(&conn_id) {
            None => Err(RegistryError::UnknownConnection(conn_id)),
            Some(Some(current)) => {
                Err(RegistryError::AlreadyInSession(conn_id, current.clone()))
            }
            Some(None) => Ok(()),
        }
    }

    /// Clears a connection's membership, returning the session it left.
    pub fn unbind(&mut self, conn_id: ConnectionId) -> Option<SessionId> {
        self.connections.get_mut(&conn_id).and_then(Option::take)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
