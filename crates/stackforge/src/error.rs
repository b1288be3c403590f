//! Unified error type for Stackforge.

use stackforge_protocol::{ErrorReason, ProtocolError};
use stackforge_registry::RegistryError;
use stackforge_session::SessionError;
use stackforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates a `From` impl,
/// so `?` converts sub-crate errors automatically. Request-level failures
/// found by the dispatcher itself have their own variants.
#[derive(Debug, thiserror::Error)]
pub enum StackforgeError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry error (unknown connection, already bound).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A session error (not found, full, turn order, ...).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The event did not name a session.
    #[error("{event} is missing sessionId")]
    MissingSessionId { event: &'static str },

    /// A required payload field other than the session id is missing.
    #[error("{event} is missing {field}")]
    InvalidPayload {
        event: &'static str,
        field: &'static str,
    },
}

impl StackforgeError {
    /// The reason reported to the client, or `None` for server-side
    /// failures that are never sent over the wire.
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            Self::Transport(_) | Self::Protocol(_) => None,
            Self::Registry(RegistryError::AlreadyInSession(..)) => {
                Some(ErrorReason::AlreadyInSession)
            }
            Self::Registry(RegistryError::UnknownConnection(_)) => {
                Some(ErrorReason::NotAParticipant)
            }
            Self::Session(e) => Some(e.reason()),
            Self::MissingSessionId { .. } => Some(ErrorReason::NotFound),
            Self::InvalidPayload { .. } => Some(ErrorReason::InvalidPayload),
        }
    }
}
