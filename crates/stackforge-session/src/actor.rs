//! Session actor: an isolated Tokio task that owns one [`Session`].
//!
//! Every operation on a session travels through its command channel and is
//! applied by the actor alone, so readiness evaluation, turn rotation and
//! departures from two connections can never interleave. The broadcasts an
//! operation produces are delivered before the next command is read, which
//! fixes their order within the session.
//!
//! Every accepted object update is followed by `turn-update`, including
//! updates made before the game starts. Until then the round-robin pointer
//! still advances and `turn-update` reports it, while snapshots leave
//! `currentTurn` unset because no turn is enforced yet. `game-started`
//! resets the pointer, and the `turn-update` after it is the first one
//! that binds.

use std::collections::HashMap;

use stackforge_protocol::{
    ConnectionId, DisplayData, GameOutcome, Quat, Recipient, ServerEvent,
    SessionId, SessionSnapshot, TrackedObject, Vec3,
};
use tokio::sync::{mpsc, oneshot};

use crate::session::{CollapseOutcome, Departure, Session};
use crate::SessionError;

/// Outbound queue of one connection. The connection's writer task drains it.
pub type Mailbox = mpsc::UnboundedSender<ServerEvent>;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    Join {
        conn_id: ConnectionId,
        display_data: DisplayData,
        mailbox: Mailbox,
        reply: Reply<SessionSnapshot>,
    },
    SetFrameOffset {
        conn_id: ConnectionId,
        offset: Vec3,
        reply: Reply<()>,
    },
    SetReady {
        conn_id: ConnectionId,
        reply: Reply<bool>,
    },
    UpdateObject {
        conn_id: ConnectionId,
        object_id: String,
        position: Vec3,
        orientation: Quat,
        reply: Reply<TrackedObject>,
    },
    Collapse {
        reporter: ConnectionId,
        causing: ConnectionId,
        reply: Reply<CollapseOutcome>,
    },
    Depart {
        conn_id: ConnectionId,
        reply: Reply<Departure>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone: it is an `mpsc::Sender` plus the session id. Every method
/// fails with [`SessionError::Unavailable`] once the actor has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Sends a command and waits for the actor's reply.
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    fn unavailable(&self) -> SessionError {
        SessionError::Unavailable(self.session_id.clone())
    }

    /// Adds a participant. The joiner receives `joined` and the existing
    /// member receives `participant-joined`. A current member joining again
    /// gets the snapshot back and nobody is notified.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        display_data: DisplayData,
        mailbox: Mailbox,
    ) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Join {
            conn_id,
            display_data,
            mailbox,
            reply,
        })
        .await
    }

    pub async fn set_frame_offset(
        &self,
        conn_id: ConnectionId,
        offset: Vec3,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetFrameOffset {
            conn_id,
            offset,
            reply,
        })
        .await
    }

    /// Returns `true` if this call started the game.
    pub async fn set_ready(
        &self,
        conn_id: ConnectionId,
    ) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::SetReady { conn_id, reply })
            .await
    }

    /// Returns the object as stored in the shared frame.
    pub async fn update_object(
        &self,
        conn_id: ConnectionId,
        object_id: String,
        position: Vec3,
        orientation: Quat,
    ) -> Result<TrackedObject, SessionError> {
        self.request(|reply| SessionCommand::UpdateObject {
            conn_id,
            object_id,
            position,
            orientation,
            reply,
        })
        .await
    }

    /// Reports a collapse caused by `causing`, on behalf of `reporter`.
    pub async fn collapse(
        &self,
        reporter: ConnectionId,
        causing: ConnectionId,
    ) -> Result<CollapseOutcome, SessionError> {
        self.request(|reply| SessionCommand::Collapse {
            reporter,
            causing,
            reply,
        })
        .await
    }

    /// Removes a participant. The actor stops itself when the session
    /// empties.
    pub async fn depart(
        &self,
        conn_id: ConnectionId,
    ) -> Result<Departure, SessionError> {
        self.request(|reply| SessionCommand::Depart { conn_id, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// Tells the actor to stop.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct SessionActor {
    session: Session,
    /// Delivery only; identity lives in `session`.
    mailboxes: HashMap<ConnectionId, Mailbox>,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        let session_id = self.session.id().clone();
        tracing::info!(%session_id, "session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Join {
                    conn_id,
                    display_data,
                    mailbox,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(conn_id, display_data, mailbox));
                }
                SessionCommand::SetFrameOffset {
                    conn_id,
                    offset,
                    reply,
                } => {
                    let _ = reply.send(self.session.set_base_frame(conn_id, offset));
                }
                SessionCommand::SetReady { conn_id, reply } => {
                    let _ = reply.send(self.handle_ready(conn_id));
                }
                SessionCommand::UpdateObject {
                    conn_id,
                    object_id,
                    position,
                    orientation,
                    reply,
                } => {
                    let result =
                        self.handle_update(conn_id, object_id, position, orientation);
                    let _ = reply.send(result);
                }
                SessionCommand::Collapse {
                    reporter,
                    causing,
                    reply,
                } => {
                    let _ = reply.send(self.handle_collapse(reporter, causing));
                }
                SessionCommand::Depart { conn_id, reply } => {
                    let result = self.handle_depart(conn_id);
                    let emptied = matches!(result, Ok(Departure::Emptied));
                    let _ = reply.send(result);
                    if emptied {
                        break;
                    }
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.session.snapshot());
                }
                SessionCommand::Shutdown => {
                    tracing::info!(%session_id, "session shutting down");
                    break;
                }
            }
        }

        tracing::info!(%session_id, "session actor stopped");
    }

    fn handle_join(
        &mut self,
        conn_id: ConnectionId,
        display_data: DisplayData,
        mailbox: Mailbox,
    ) -> Result<SessionSnapshot, SessionError> {
        if self.session.contains(conn_id) {
            return Ok(self.session.snapshot());
        }
        let snapshot = self.session.join(conn_id, display_data.clone())?;
        self.mailboxes.insert(conn_id, mailbox);
        tracing::info!(
            session_id = %self.session.id(),
            %conn_id,
            participants = self.session.len(),
            "participant joined"
        );

        let session_id = self.session.id().clone();
        self.dispatch(vec![
            (
                Recipient::Connection(conn_id),
                ServerEvent::Joined {
                    session_id,
                    state: snapshot.clone(),
                },
            ),
            (
                Recipient::AllExcept(conn_id),
                ServerEvent::ParticipantJoined {
                    connection_id: conn_id,
                    display_data,
                },
            ),
        ]);
        Ok(snapshot)
    }

    fn handle_ready(&mut self, conn_id: ConnectionId) -> Result<bool, SessionError> {
        let started = self.session.set_ready(conn_id)?;
        if !started {
            return Ok(false);
        }

        let Some(first) = self.session.current_turn() else {
            return Ok(true);
        };
        tracing::info!(
            session_id = %self.session.id(),
            first_turn = %first,
            "game started"
        );
        self.dispatch(vec![
            (
                Recipient::All,
                ServerEvent::GameStarted {
                    tracked_objects: self.session.tracked_objects(),
                },
            ),
            (
                Recipient::All,
                ServerEvent::TurnUpdate {
                    current_turn: first,
                    session_id: self.session.id().clone(),
                },
            ),
        ]);
        Ok(true)
    }

    fn handle_update(
        &mut self,
        conn_id: ConnectionId,
        object_id: String,
        position: Vec3,
        orientation: Quat,
    ) -> Result<TrackedObject, SessionError> {
        let moved = self
            .session
            .update_object(conn_id, object_id, position, orientation)?;
        let session_id = self.session.id().clone();
        tracing::trace!(
            %session_id,
            %conn_id,
            object_id = %moved.object.id,
            next_turn = %moved.next_turn,
            "object updated"
        );

        self.dispatch(vec![
            (
                Recipient::All,
                ServerEvent::ObjectUpdated {
                    session_id: session_id.clone(),
                    object_id: moved.object.id.clone(),
                    relative_position: moved.object.position,
                    orientation: moved.object.orientation,
                },
            ),
            (
                Recipient::All,
                ServerEvent::TurnUpdate {
                    current_turn: moved.next_turn,
                    session_id,
                },
            ),
        ]);
        Ok(moved.object)
    }

    fn handle_collapse(
        &mut self,
        reporter: ConnectionId,
        causing: ConnectionId,
    ) -> Result<CollapseOutcome, SessionError> {
        if !self.session.contains(reporter) {
            return Err(SessionError::NotAParticipant(
                reporter,
                self.session.id().clone(),
            ));
        }

        let outcome = self.session.resolve_collapse(causing)?;
        let session_id = self.session.id().clone();
        tracing::info!(
            %session_id,
            %reporter,
            loser = %outcome.loser,
            winners = outcome.winners.len(),
            "tower collapsed"
        );

        let mut events = vec![(
            Recipient::Connection(outcome.loser),
            ServerEvent::GameResult {
                message: GameOutcome::Lost,
                session_id: session_id.clone(),
                connection_id: Some(outcome.loser),
            },
        )];
        events.extend(outcome.winners.iter().map(|winner| {
            (
                Recipient::Connection(*winner),
                ServerEvent::GameResult {
                    message: GameOutcome::Won,
                    session_id: session_id.clone(),
                    connection_id: None,
                },
            )
        }));
        self.dispatch(events);
        self.session.mark_resolved();
        Ok(outcome)
    }

    fn handle_depart(&mut self, conn_id: ConnectionId) -> Result<Departure, SessionError> {
        let departure = self.session.depart(conn_id)?;
        self.mailboxes.remove(&conn_id);
        tracing::info!(
            session_id = %self.session.id(),
            %conn_id,
            participants = self.session.len(),
            "participant left"
        );

        if let Departure::Remaining(remaining) = departure {
            self.dispatch(vec![(
                Recipient::Connection(remaining),
                ServerEvent::ParticipantLeft {
                    connection_id: conn_id,
                },
            )]);
        }
        Ok(departure)
    }

    /// Delivers events to their recipients, in order.
    fn dispatch(&self, events: Vec<(Recipient, ServerEvent)>) {
        let members = self.session.participant_ids();
        for (recipient, event) in events {
            match recipient {
                Recipient::All => {
                    for conn_id in &members {
                        self.send_to(*conn_id, event.clone());
                    }
                }
                Recipient::Connection(conn_id) => self.send_to(conn_id, event),
                Recipient::AllExcept(excluded) => {
                    for conn_id in members.iter().filter(|c| **c != excluded) {
                        self.send_to(*conn_id, event.clone());
                    }
                }
            }
        }
    }

    /// Silently drops the event if the connection's writer is gone.
    fn send_to(&self, conn_id: ConnectionId, event: ServerEvent) {
        if let Some(mailbox) = self.mailboxes.get(&conn_id) {
            let _ = mailbox.send(event);
        }
    }
}

/// Spawns a session actor for a freshly created session.
///
/// `channel_size` bounds the command queue; callers wait when it is full.
pub(crate) fn spawn_session(
    session: Session,
    creator_mailbox: Mailbox,
    channel_size: usize,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));
    let session_id = session.id().clone();

    let mut mailboxes = HashMap::new();
    if let Some(creator) = session.participants().first() {
        mailboxes.insert(creator.connection_id, creator_mailbox);
    }

    let actor = SessionActor {
        session,
        mailboxes,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    SessionHandle {
        session_id,
        sender: tx,
    }
}
