//! Session directory: creates, tracks, and destroys sessions.

use std::collections::HashMap;

use rand::Rng;
use stackforge_protocol::{ConnectionId, DisplayData, SessionId, SessionSnapshot};
use tokio::sync::Mutex;

use crate::actor::{spawn_session, Mailbox, SessionHandle};
use crate::session::Session;
use crate::{DirectoryConfig, SessionError};

/// Characters used in generated session ids.
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Shortest id the directory hands out, whatever the configured length.
pub const MIN_ID_LENGTH: usize = 4;

/// Longest id the directory grows to before giving up.
pub const MAX_ID_LENGTH: usize = 16;

/// Candidates tried at one length before moving to the next.
pub const ID_ATTEMPTS_PER_LENGTH: usize = 8;

/// Owns the id → session mapping.
///
/// The map lock is held only to look up, insert, or remove a handle. All
/// gameplay goes through the [`SessionHandle`] after the lock is released,
/// so sessions never contend with each other.
pub struct SessionDirectory {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    config: DirectoryConfig,
}

impl SessionDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Creates a session with `creator` as its only participant and
    /// returns its freshly generated id.
    ///
    /// # Errors
    /// [`SessionError::IdsExhausted`] if no free id was found even at
    /// [`MAX_ID_LENGTH`]. The directory is unchanged.
    pub async fn create(
        &self,
        creator: ConnectionId,
        display_data: DisplayData,
        mailbox: Mailbox,
    ) -> Result<SessionId, SessionError> {
        self.create_with(creator, display_data, mailbox, generate_session_id)
            .await
    }

    /// Like [`create`](Self::create) with an explicit id source, called with
    /// the length it should produce. After [`ID_ATTEMPTS_PER_LENGTH`]
    /// collisions the length grows by one.
    async fn create_with(
        &self,
        creator: ConnectionId,
        display_data: DisplayData,
        mailbox: Mailbox,
        mut next_id: impl FnMut(usize) -> SessionId,
    ) -> Result<SessionId, SessionError> {
        let mut sessions = self.sessions.lock().await;

        let start = self.config.id_length.clamp(MIN_ID_LENGTH, MAX_ID_LENGTH);
        let session_id = (start..=MAX_ID_LENGTH)
            .flat_map(|length| (0..ID_ATTEMPTS_PER_LENGTH).map(move |_| length))
            .map(&mut next_id)
            .find(|candidate| {
                let taken = sessions.contains_key(candidate);
                if taken {
                    tracing::debug!(session_id = %candidate, "session id collision, regenerating");
                }
                !taken
            })
            .ok_or_else(|| {
                tracing::warn!(live = sessions.len(), "no free session id");
                SessionError::IdsExhausted
            })?;

        let session = Session::new(session_id.clone(), creator, display_data);
        let handle = spawn_session(session, mailbox, self.config.command_buffer);
        sessions.insert(session_id.clone(), handle);

        tracing::info!(%session_id, %creator, live = sessions.len(), "session created");
        Ok(session_id)
    }

    /// Returns a handle to a live session.
    pub async fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Removes a session and stops its actor. Returns `false` if it was
    /// already gone.
    pub async fn remove(&self, session_id: &SessionId) -> bool {
        let handle = self.sessions.lock().await.remove(session_id);
        match handle {
            Some(handle) => {
                // The actor stops on its own once emptied; this covers the rest.
                let _ = handle.shutdown().await;
                tracing::info!(%session_id, "session destroyed");
                true
            }
            None => false,
        }
    }

    /// Adds a participant to an existing session.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if no such session is live
    /// - [`SessionError::Full`] if it already has two participants
    pub async fn join(
        &self,
        session_id: &SessionId,
        conn_id: ConnectionId,
        display_data: DisplayData,
        mailbox: Mailbox,
    ) -> Result<SessionSnapshot, SessionError> {
        let handle = self
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

        handle
            .join(conn_id, display_data, mailbox)
            .await
            .map_err(|e| match e {
                SessionError::Unavailable(id) => SessionError::NotFound(id),
                other => other,
            })
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Ids of all live sessions.
    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.lock().await.keys().cloned().collect()
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(DirectoryConfig::default())
    }
}

/// Generates a random lowercase base-36 id of the given length.
fn generate_session_id(length: usize) -> SessionId {
    let mut rng = rand::rng();
    let id: String = (0..length)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    SessionId::new(id)
}
