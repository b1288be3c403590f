//! Error types for the session layer.

use stackforge_protocol::{ConnectionId, ErrorReason, SessionId};

/// Errors that can occur during session operations.
///
/// All of them are recoverable: the dispatcher reports them to the
/// originating connection and the session carries on untouched.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session does not exist.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session already has two participants.
    #[error("session {0} is full")]
    Full(SessionId),

    /// The connection is not a member of this session.
    #[error("{0} is not a participant of session {1}")]
    NotAParticipant(ConnectionId, SessionId),

    /// The participant sent an object update before calibrating.
    #[error("{0} has not set a frame offset")]
    FrameNotCalibrated(ConnectionId),

    /// The participant moved while it was someone else's turn.
    #[error("{sender} moved out of turn, it is {current}'s turn")]
    OutOfTurn {
        sender: ConnectionId,
        current: ConnectionId,
    },

    /// A collapse already decided this session's game.
    #[error("session {0} has already been resolved")]
    AlreadyResolved(SessionId),

    /// The session actor has stopped or its command queue is closed.
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),

    /// Every candidate session id collided with a live session.
    #[error("no free session id")]
    IdsExhausted,
}

impl SessionError {
    /// The wire reason reported to the client.
    ///
    /// A stopped actor looks the same as a missing session to clients.
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::NotFound(_) | Self::Unavailable(_) => ErrorReason::NotFound,
            Self::Full(_) => ErrorReason::Full,
            Self::NotAParticipant(..) => ErrorReason::NotAParticipant,
            Self::FrameNotCalibrated(_) => ErrorReason::FrameNotCalibrated,
            Self::OutOfTurn { .. } => ErrorReason::OutOfTurn,
            Self::AlreadyResolved(_) => ErrorReason::AlreadyResolved,
            Self::IdsExhausted => ErrorReason::Unavailable,
        }
    }
}
