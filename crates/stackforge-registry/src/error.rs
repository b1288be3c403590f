//! Error types for the registry.

use stackforge_protocol::{ConnectionId, SessionId};

/// Errors raised while binding connections to sessions.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The connection was never registered, or has already gone away.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// A connection belongs to at most one session at a time.
    #[error("connection {0} already belongs to session {1}")]
    AlreadyInSession(ConnectionId, SessionId),
}
