//! Protocol dispatcher: turns one client event into one session operation.
//!
//! The dispatcher owns the connection registry and the session directory.
//! For every event it checks the payload shape, resolves the sender's
//! session, and forwards the operation to that session's actor. The actor
//! performs the fan-out; the dispatcher only unicasts replies and errors to
//! the sender.

use std::time::Instant;

use stackforge_protocol::{
    ClientEvent, ConnectionId, DisplayData, ServerEvent, SessionId,
};
use stackforge_registry::ConnectionRegistry;
use stackforge_session::{
    Departure, DirectoryConfig, Mailbox, SessionDirectory, SessionError,
    SessionHandle,
};
use tokio::sync::Mutex;

use crate::StackforgeError;

/// Routes client events to sessions.
///
/// Shared by every connection task. The registry lock is held for single
/// lookups and updates only, never while waiting on a session actor.
pub struct Dispatcher {
    registry: Mutex<ConnectionRegistry>,
    directory: SessionDirectory,
    started: Instant,
}

impl Dispatcher {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            registry: Mutex::new(ConnectionRegistry::new()),
            directory: SessionDirectory::new(config),
            started: Instant::now(),
        }
    }

    /// The session directory this dispatcher routes into.
    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    /// Milliseconds since the dispatcher was created.
    pub fn server_time(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Registers a new connection and tells it its own id.
    pub async fn connect(&self, conn_id: ConnectionId, mailbox: &Mailbox) {
        self.registry.lock().await.register(conn_id);
        tracing::info!(%conn_id, "connection accepted");
        let _ = mailbox.send(ServerEvent::Connected {
            connection_id: conn_id,
            server_time: self.server_time(),
        });
    }

    /// Applies one inbound event from `conn_id`.
    ///
    /// Failures never escape: they are logged and, for events that report
    /// errors, unicast back to the sender as a single `error` event.
    pub async fn handle(
        &self,
        conn_id: ConnectionId,
        mailbox: &Mailbox,
        event: ClientEvent,
    ) {
        let name = event.name();
        let reports = reports_errors(&event);
        tracing::trace!(%conn_id, event = name, "event received");

        let Err(e) = self.apply(conn_id, mailbox, event).await else {
            return;
        };
        tracing::debug!(%conn_id, event = name, error = %e, "event rejected");

        if !reports {
            return;
        }
        if let Some(reason) = e.reason() {
            let _ = mailbox.send(ServerEvent::Error {
                reason,
                message: e.to_string(),
            });
        }
    }

    /// Forgets a closed connection and runs departure for its session.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let session = self.registry.lock().await.unregister(conn_id);
        tracing::info!(%conn_id, "connection closed");

        let Some(session_id) = session else {
            return;
        };
        match self.directory.get(&session_id).await {
            Some(handle) => self.depart(conn_id, &handle).await,
            None => {
                tracing::debug!(%conn_id, %session_id, "session already gone");
            }
        }
    }

    async fn apply(
        &self,
        conn_id: ConnectionId,
        mailbox: &Mailbox,
        event: ClientEvent,
    ) -> Result<(), StackforgeError> {
        let name = event.name();
        match event {
            ClientEvent::CreateSession { display_data } => {
                self.create_session(conn_id, mailbox, display_data).await
            }

            ClientEvent::JoinSession {
                session_id,
                display_data,
            } => {
                let session_id = require_session(name, session_id)?;
                self.join_session(conn_id, mailbox, session_id, display_data)
                    .await
            }

            ClientEvent::SetFrameOffset { session_id, offset } => {
                let session_id = require_session(name, session_id)?;
                let offset = require(name, "offset", offset)?;
                let handle = self.resolve(conn_id, session_id).await?;
                handle.set_frame_offset(conn_id, offset).await?;
                tracing::debug!(
                    %conn_id,
                    session_id = %handle.session_id(),
                    x = offset.x,
                    y = offset.y,
                    z = offset.z,
                    "frame offset set"
                );
                Ok(())
            }

            ClientEvent::SetReady { session_id } => {
                let session_id = require_session(name, session_id)?;
                let handle = self.resolve(conn_id, session_id).await?;
                let started = handle.set_ready(conn_id).await?;
                tracing::debug!(
                    %conn_id,
                    session_id = %handle.session_id(),
                    started,
                    "participant ready"
                );
                Ok(())
            }

            ClientEvent::UpdateObject {
                session_id,
                object_id,
                position,
                orientation,
            } => {
                let session_id = require_session(name, session_id)?;
                let object_id = require(name, "objectId", object_id)?;
                let position = require(name, "position", position)?;
                let orientation = require(name, "orientation", orientation)?;
                let handle = self.resolve(conn_id, session_id).await?;
                handle
                    .update_object(conn_id, object_id, position, orientation)
                    .await?;
                Ok(())
            }

            ClientEvent::Collapse {
                session_id,
                causing_connection_id,
            } => {
                let session_id = require_session(name, session_id)?;
                let causing =
                    require(name, "causingConnectionId", causing_connection_id)?;
                let handle = self.resolve(conn_id, session_id).await?;
                handle.collapse(conn_id, causing).await?;
                Ok(())
            }

            ClientEvent::LeaveSession { session_id } => {
                let session_id = require_session(name, session_id)?;
                let handle = self.resolve(conn_id, session_id).await?;
                self.registry.lock().await.unbind(conn_id);
                self.depart(conn_id, &handle).await;
                Ok(())
            }

            ClientEvent::Heartbeat { client_time } => {
                let _ = mailbox.send(ServerEvent::HeartbeatAck {
                    client_time,
                    server_time: self.server_time(),
                });
                Ok(())
            }
        }
    }

    async fn create_session(
        &self,
        conn_id: ConnectionId,
        mailbox: &Mailbox,
        display_data: DisplayData,
    ) -> Result<(), StackforgeError> {
        self.registry.lock().await.ensure_unbound(conn_id)?;

        let session_id = self
            .directory
            .create(conn_id, display_data, mailbox.clone())
            .await?;
        self.bind_or_leave(conn_id, &session_id).await?;

        let _ = mailbox.send(ServerEvent::SessionCreated { session_id });
        Ok(())
    }

    async fn join_session(
        &self,
        conn_id: ConnectionId,
        mailbox: &Mailbox,
        session_id: SessionId,
        display_data: DisplayData,
    ) -> Result<(), StackforgeError> {
        self.registry.lock().await.ensure_unbound(conn_id)?;

        // The actor sends `joined` and `participant-joined` itself.
        self.directory
            .join(&session_id, conn_id, display_data, mailbox.clone())
            .await?;
        self.bind_or_leave(conn_id, &session_id).await
    }

    /// Records membership in the registry. If that fails the connection is
    /// taken back out of the session so neither side holds a stale entry.
    async fn bind_or_leave(
        &self,
        conn_id: ConnectionId,
        session_id: &SessionId,
    ) -> Result<(), StackforgeError> {
        let bound = self.registry.lock().await.bind(conn_id, session_id.clone());
        if let Err(e) = bound {
            tracing::warn!(%conn_id, %session_id, error = %e, "binding failed");
            if let Some(handle) = self.directory.get(session_id).await {
                self.depart(conn_id, &handle).await;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Finds the session an event refers to and checks that the sender is
    /// bound to it.
    async fn resolve(
        &self,
        conn_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<SessionHandle, StackforgeError> {
        let handle = self
            .directory
            .get(&session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

        let bound = self.registry.lock().await.session_of(conn_id);
        if bound.as_ref() != Some(&session_id) {
            tracing::warn!(
                %conn_id,
                %session_id,
                bound = ?bound.as_ref().map(SessionId::as_str),
                "event for a session the connection is not in"
            );
            return Err(SessionError::NotAParticipant(conn_id, session_id).into());
        }
        Ok(handle)
    }

    /// Removes a participant, destroying the session once it is empty.
    async fn depart(&self, conn_id: ConnectionId, handle: &SessionHandle) {
        let session_id = handle.session_id();
        match handle.depart(conn_id).await {
            Ok(Departure::Emptied) | Err(SessionError::Unavailable(_)) => {
                self.directory.remove(session_id).await;
            }
            Ok(Departure::Remaining(remaining)) => {
                tracing::debug!(%conn_id, %session_id, %remaining, "departure handled");
            }
            Err(e) => {
                tracing::debug!(%conn_id, %session_id, error = %e, "departure failed");
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DirectoryConfig::default())
    }
}

/// Calibration, readiness and leave failures are logged but not reported.
fn reports_errors(event: &ClientEvent) -> bool {
    !matches!(
        event,
        ClientEvent::SetFrameOffset { .. }
            | ClientEvent::SetReady { .. }
            | ClientEvent::LeaveSession { .. }
    )
}

fn require_session(
    event: &'static str,
    session_id: Option<SessionId>,
) -> Result<SessionId, StackforgeError> {
    session_id.ok_or(StackforgeError::MissingSessionId { event })
}

fn require<T>(
    event: &'static str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, StackforgeError> {
    value.ok_or(StackforgeError::InvalidPayload { event, field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackforge_protocol::{
        ErrorReason, GameOutcome, Quat, SessionPhase, Vec3,
    };
    use tokio::sync::mpsc;

    struct Client {
        id: ConnectionId,
        mailbox: Mailbox,
        inbox: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        async fn connect(dispatcher: &Dispatcher, id: u64) -> Self {
            let (mailbox, inbox) = mpsc::unbounded_channel();
            let mut client = Self {
                id: ConnectionId::new(id),
                mailbox,
                inbox,
            };
            dispatcher.connect(client.id, &client.mailbox).await;
            client.drain();
            client
        }

        async fn send(&self, dispatcher: &Dispatcher, event: ClientEvent) {
            dispatcher.handle(self.id, &self.mailbox, event).await;
        }

        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.inbox.try_recv() {
                events.push(event);
            }
            events
        }

        fn expect_error(&mut self) -> ErrorReason {
            match self.drain().as_slice() {
                [ServerEvent::Error { reason, .. }] => *reason,
                other => panic!("expected a single error, got {other:?}"),
            }
        }
    }

    fn create() -> ClientEvent {
        ClientEvent::CreateSession {
            display_data: json!({}),
        }
    }

    fn join(sid: &SessionId) -> ClientEvent {
        ClientEvent::JoinSession {
            session_id: Some(sid.clone()),
            display_data: json!({}),
        }
    }

    fn ready(sid: &SessionId) -> ClientEvent {
        ClientEvent::SetReady {
            session_id: Some(sid.clone()),
        }
    }

    fn offset(sid: &SessionId, offset: Vec3) -> ClientEvent {
        ClientEvent::SetFrameOffset {
            session_id: Some(sid.clone()),
            offset: Some(offset),
        }
    }

    fn update(sid: &SessionId, object_id: &str, position: Vec3) -> ClientEvent {
        ClientEvent::UpdateObject {
            session_id: Some(sid.clone()),
            object_id: Some(object_id.into()),
            position: Some(position),
            orientation: Some(Quat::IDENTITY),
        }
    }

    async fn create_session(dispatcher: &Dispatcher, client: &mut Client) -> SessionId {
        client.send(dispatcher, create()).await;
        match client.drain().as_slice() {
            [ServerEvent::SessionCreated { session_id }] => session_id.clone(),
            other => panic!("expected session-created, got {other:?}"),
        }
    }

    /// A creates, B joins; inboxes drained.
    async fn pair(dispatcher: &Dispatcher) -> (Client, Client, SessionId) {
        let mut a = Client::connect(dispatcher, 1).await;
        let mut b = Client::connect(dispatcher, 2).await;
        let sid = create_session(dispatcher, &mut a).await;
        b.send(dispatcher, join(&sid)).await;
        a.drain();
        b.drain();
        (a, b, sid)
    }

    /// Both ready and A calibrated at the origin; inboxes drained.
    async fn in_play(dispatcher: &Dispatcher) -> (Client, Client, SessionId) {
        let (mut a, mut b, sid) = pair(dispatcher).await;
        a.send(dispatcher, ready(&sid)).await;
        b.send(dispatcher, ready(&sid)).await;
        a.send(dispatcher, offset(&sid, Vec3::ZERO)).await;
        b.send(dispatcher, offset(&sid, Vec3::ZERO)).await;
        a.drain();
        b.drain();
        (a, b, sid)
    }

    #[tokio::test]
    async fn test_connect_sends_connected_with_own_id() {
        let dispatcher = Dispatcher::default();
        let (mailbox, mut inbox) = mpsc::unbounded_channel();
        dispatcher.connect(ConnectionId::new(5), &mailbox).await;
        assert!(matches!(
            inbox.try_recv(),
            Ok(ServerEvent::Connected { connection_id, .. }) if connection_id == ConnectionId::new(5)
        ));
    }

    #[tokio::test]
    async fn test_create_session_registers_live_session() {
        let dispatcher = Dispatcher::default();
        let mut a = Client::connect(&dispatcher, 1).await;
        let sid = create_session(&dispatcher, &mut a).await;
        assert_eq!(sid.as_str().len(), 6);
        assert_eq!(dispatcher.directory().ids().await, vec![sid]);
    }

    #[tokio::test]
    async fn test_create_session_while_bound_returns_already_in_session() {
        let dispatcher = Dispatcher::default();
        let mut a = Client::connect(&dispatcher, 1).await;
        create_session(&dispatcher, &mut a).await;

        a.send(&dispatcher, create()).await;
        assert_eq!(a.expect_error(), ErrorReason::AlreadyInSession);
        assert_eq!(dispatcher.directory().len().await, 1);
    }

    #[tokio::test]
    async fn test_join_session_missing_id_returns_not_found() {
        let dispatcher = Dispatcher::default();
        let mut b = Client::connect(&dispatcher, 2).await;
        b.send(
            &dispatcher,
            ClientEvent::JoinSession {
                session_id: None,
                display_data: json!({}),
            },
        )
        .await;
        assert_eq!(b.expect_error(), ErrorReason::NotFound);
    }

    #[tokio::test]
    async fn test_join_session_unknown_returns_not_found() {
        let dispatcher = Dispatcher::default();
        let mut b = Client::connect(&dispatcher, 2).await;
        b.send(&dispatcher, join(&SessionId::new("zzzzzz"))).await;
        assert_eq!(b.expect_error(), ErrorReason::NotFound);
    }

    #[tokio::test]
    async fn test_join_session_third_connection_returns_full() {
        let dispatcher = Dispatcher::default();
        let (mut a, _b, sid) = pair(&dispatcher).await;
        let mut c = Client::connect(&dispatcher, 3).await;

        c.send(&dispatcher, join(&sid)).await;
        assert_eq!(c.expect_error(), ErrorReason::Full);
        assert!(a.drain().is_empty());

        // C stays unbound and can still open its own session.
        create_session(&dispatcher, &mut c).await;
    }

    #[tokio::test]
    async fn test_join_session_own_session_returns_already_in_session() {
        let dispatcher = Dispatcher::default();
        let mut a = Client::connect(&dispatcher, 1).await;
        let sid = create_session(&dispatcher, &mut a).await;
        a.send(&dispatcher, join(&sid)).await;
        assert_eq!(a.expect_error(), ErrorReason::AlreadyInSession);
    }

    #[tokio::test]
    async fn test_set_ready_for_foreign_session_is_silent() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = pair(&dispatcher).await;
        let mut c = Client::connect(&dispatcher, 3).await;

        c.send(&dispatcher, ready(&sid)).await;
        c.send(&dispatcher, offset(&sid, Vec3::ZERO)).await;
        assert!(c.drain().is_empty());
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());

        let handle = dispatcher.directory().get(&sid).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.participants.iter().all(|p| !p.ready));
    }

    #[tokio::test]
    async fn test_update_object_from_non_member_returns_not_a_participant() {
        let dispatcher = Dispatcher::default();
        let (mut a, _b, sid) = pair(&dispatcher).await;
        let mut c = Client::connect(&dispatcher, 3).await;

        c.send(&dispatcher, update(&sid, "obj1", Vec3::ZERO)).await;
        assert_eq!(c.expect_error(), ErrorReason::NotAParticipant);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_update_object_missing_position_returns_invalid_payload() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = in_play(&dispatcher).await;

        a.send(
            &dispatcher,
            ClientEvent::UpdateObject {
                session_id: Some(sid.clone()),
                object_id: Some("obj1".into()),
                position: None,
                orientation: Some(Quat::IDENTITY),
            },
        )
        .await;
        assert_eq!(a.expect_error(), ErrorReason::InvalidPayload);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_update_object_before_calibration_returns_frame_not_calibrated() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = pair(&dispatcher).await;
        a.send(&dispatcher, ready(&sid)).await;
        b.send(&dispatcher, ready(&sid)).await;
        a.drain();
        b.drain();

        a.send(&dispatcher, update(&sid, "obj1", Vec3::ZERO)).await;
        assert_eq!(a.expect_error(), ErrorReason::FrameNotCalibrated);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_update_object_out_of_turn_returns_error_without_broadcast() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = in_play(&dispatcher).await;

        b.send(&dispatcher, update(&sid, "obj1", Vec3::ZERO)).await;
        assert_eq!(b.expect_error(), ErrorReason::OutOfTurn);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_two_player_round_trip_scenario() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = pair(&dispatcher).await;

        a.send(&dispatcher, ready(&sid)).await;
        b.send(&dispatcher, ready(&sid)).await;
        for client in [&mut a, &mut b] {
            let events = client.drain();
            assert!(matches!(events[0], ServerEvent::GameStarted { .. }));
            assert_eq!(
                events[1],
                ServerEvent::TurnUpdate {
                    current_turn: ConnectionId::new(1),
                    session_id: sid.clone(),
                }
            );
        }

        a.send(&dispatcher, offset(&sid, Vec3::ZERO)).await;
        a.send(&dispatcher, update(&sid, "obj1", Vec3::new(1.0, 1.0, 1.0)))
            .await;
        for client in [&mut a, &mut b] {
            assert_eq!(
                client.drain(),
                vec![
                    ServerEvent::ObjectUpdated {
                        session_id: sid.clone(),
                        object_id: "obj1".into(),
                        relative_position: Vec3::new(1.0, 1.0, 1.0),
                        orientation: Quat::IDENTITY,
                    },
                    ServerEvent::TurnUpdate {
                        current_turn: ConnectionId::new(2),
                        session_id: sid.clone(),
                    },
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_collapse_unknown_session_returns_not_found() {
        let dispatcher = Dispatcher::default();
        let mut a = Client::connect(&dispatcher, 1).await;
        a.send(
            &dispatcher,
            ClientEvent::Collapse {
                session_id: Some(SessionId::new("ghost0")),
                causing_connection_id: Some(ConnectionId::new(1)),
            },
        )
        .await;
        assert_eq!(a.expect_error(), ErrorReason::NotFound);
    }

    #[tokio::test]
    async fn test_collapse_then_update_returns_already_resolved() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = in_play(&dispatcher).await;

        b.send(
            &dispatcher,
            ClientEvent::Collapse {
                session_id: Some(sid.clone()),
                causing_connection_id: Some(ConnectionId::new(2)),
            },
        )
        .await;
        assert!(matches!(
            b.drain().as_slice(),
            [ServerEvent::GameResult { message: GameOutcome::Lost, .. }]
        ));
        assert!(matches!(
            a.drain().as_slice(),
            [ServerEvent::GameResult { message: GameOutcome::Won, .. }]
        ));

        a.send(&dispatcher, update(&sid, "obj1", Vec3::ZERO)).await;
        assert_eq!(a.expect_error(), ErrorReason::AlreadyResolved);
    }

    #[tokio::test]
    async fn test_leave_session_notifies_remaining_and_unbinds() {
        let dispatcher = Dispatcher::default();
        let (mut a, mut b, sid) = pair(&dispatcher).await;

        b.send(
            &dispatcher,
            ClientEvent::LeaveSession {
                session_id: Some(sid.clone()),
            },
        )
        .await;
        assert_eq!(
            a.drain(),
            vec![ServerEvent::ParticipantLeft {
                connection_id: ConnectionId::new(2)
            }]
        );
        assert!(b.drain().is_empty());

        // B is free to create a new session; A's session lives on.
        create_session(&dispatcher, &mut b).await;
        assert_eq!(dispatcher.directory().len().await, 2);
    }

    #[tokio::test]
    async fn test_disconnect_last_participant_destroys_session() {
        let dispatcher = Dispatcher::default();
        let (_a, _b, sid) = pair(&dispatcher).await;

        dispatcher.disconnect(ConnectionId::new(1)).await;
        dispatcher.disconnect(ConnectionId::new(2)).await;
        assert!(dispatcher.directory().is_empty().await);

        let mut c = Client::connect(&dispatcher, 3).await;
        c.send(&dispatcher, join(&sid)).await;
        assert_eq!(c.expect_error(), ErrorReason::NotFound);
    }

    #[tokio::test]
    async fn test_disconnect_mid_game_returns_session_to_forming() {
        let dispatcher = Dispatcher::default();
        let (mut a, _b, sid) = in_play(&dispatcher).await;

        dispatcher.disconnect(ConnectionId::new(2)).await;
        assert_eq!(
            a.drain(),
            vec![ServerEvent::ParticipantLeft {
                connection_id: ConnectionId::new(2)
            }]
        );

        let handle = dispatcher.directory().get(&sid).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Forming);
        assert_eq!(snapshot.current_turn, None);
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_harmless() {
        let dispatcher = Dispatcher::default();
        let (mut a, _b, _sid) = pair(&dispatcher).await;
        dispatcher.disconnect(ConnectionId::new(2)).await;
        dispatcher.disconnect(ConnectionId::new(2)).await;
        assert_eq!(a.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_echoes_client_time() {
        let dispatcher = Dispatcher::default();
        let mut a = Client::connect(&dispatcher, 1).await;
        a.send(&dispatcher, ClientEvent::Heartbeat { client_time: 1234 })
            .await;
        assert!(matches!(
            a.drain().as_slice(),
            [ServerEvent::HeartbeatAck { client_time: 1234, .. }]
        ));
    }
}
