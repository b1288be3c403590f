//! Session layer for Stackforge.
//!
//! A session is one two-player game: who is in it, where each device's
//! origin sits relative to the shared origin, who is ready, whose turn it
//! is, and where every block is. Each session runs as an isolated Tokio
//! task (actor model) so operations on one session are strictly serialized
//! while different sessions proceed independently.
//!
//! # Key types
//!
//! - [`Session`]: the state machine and its transitions
//! - [`SessionHandle`]: send operations to a running session actor
//! - [`SessionDirectory`]: creates/destroys sessions, resolves ids
//! - [`DirectoryConfig`]: id length and queue sizing

mod actor;
mod config;
mod directory;
mod error;
mod session;

pub use actor::{Mailbox, SessionHandle};
pub use config::DirectoryConfig;
pub use directory::{
    SessionDirectory, ID_ATTEMPTS_PER_LENGTH, MAX_ID_LENGTH, MIN_ID_LENGTH,
};
pub use error::SessionError;
pub use session::{
    CollapseOutcome, Departure, ObjectMove, Participant, Session,
    MAX_PARTICIPANTS,
};
