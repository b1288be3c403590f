//! The event catalogue: every named message a client may send and every
//! named message the server emits.
//!
//! On the wire each event is an adjacently tagged JSON object:
//!
//! ```text
//! { "event": "update-object",
//!   "data":  { "sessionId": "k3j9x0", "objectId": "block-4", ... } }
//! ```
//!
//! Event names are kebab-case, field names camelCase.

use serde::{Deserialize, Serialize};
use stackforge_transport::ConnectionId;

use crate::{DisplayData, Quat, SessionId, SessionSnapshot, TrackedObject, Vec3};

/// Client → server events.
///
/// Every field a client is expected to send is optional at this level.
/// Shape is checked by the dispatcher before any session state is touched,
/// so a frame with a missing `sessionId` is a rejected request rather than
/// a decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Open a new session with the sender as its only participant.
    CreateSession {
        #[serde(default)]
        display_data: DisplayData,
    },

    /// Join an existing session by id.
    JoinSession {
        session_id: Option<SessionId>,
        #[serde(default)]
        display_data: DisplayData,
    },

    /// Calibrate: the translation from the sender's device origin to the
    /// shared session origin.
    SetFrameOffset {
        session_id: Option<SessionId>,
        offset: Option<Vec3>,
    },

    /// The sender is ready to play.
    SetReady { session_id: Option<SessionId> },

    /// A block moved. `position` is in the sender's local frame.
    UpdateObject {
        session_id: Option<SessionId>,
        object_id: Option<String>,
        position: Option<Vec3>,
        orientation: Option<Quat>,
    },

    /// The tower fell; `causing_connection_id` knocked it over.
    Collapse {
        session_id: Option<SessionId>,
        causing_connection_id: Option<ConnectionId>,
    },

    /// Leave the session without closing the connection.
    LeaveSession { session_id: Option<SessionId> },

    /// Keep-alive with the client's clock for RTT estimation.
    Heartbeat {
        #[serde(default)]
        client_time: u64,
    },
}

impl ClientEvent {
    /// The wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "create-session",
            Self::JoinSession { .. } => "join-session",
            Self::SetFrameOffset { .. } => "set-frame-offset",
            Self::SetReady { .. } => "set-ready",
            Self::UpdateObject { .. } => "update-object",
            Self::Collapse { .. } => "collapse",
            Self::LeaveSession { .. } => "leave-session",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// How a game ended for the receiving participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Won,
    Lost,
}

/// Machine-readable reason carried by [`ServerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    /// The referenced session does not exist.
    NotFound,
    /// The session already has two participants.
    Full,
    /// The sender is not a member of the referenced session.
    NotAParticipant,
    /// Object update before the sender set a frame offset.
    FrameNotCalibrated,
    /// Object update while it is the other participant's turn.
    OutOfTurn,
    /// The game in this session has already been decided.
    AlreadyResolved,
    /// The sender already belongs to a different session.
    AlreadyInSession,
    /// A required payload field is missing.
    InvalidPayload,
    /// The server cannot open another session right now.
    Unavailable,
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// First frame on every connection: the client's own identity.
    Connected {
        connection_id: ConnectionId,
        server_time: u64,
    },

    SessionCreated { session_id: SessionId },

    /// Sent to the joiner with the full session state.
    Joined {
        session_id: SessionId,
        state: SessionSnapshot,
    },

    /// Sent to the existing member when someone joins.
    ParticipantJoined {
        connection_id: ConnectionId,
        display_data: DisplayData,
    },

    /// Sent to the remaining member when the other departs.
    ParticipantLeft { connection_id: ConnectionId },

    GameStarted { tracked_objects: Vec<TrackedObject> },

    TurnUpdate {
        current_turn: ConnectionId,
        session_id: SessionId,
    },

    /// A pose in the shared session frame.
    ObjectUpdated {
        session_id: SessionId,
        object_id: String,
        relative_position: Vec3,
        orientation: Quat,
    },

    /// Win/loss notice after a collapse. `connection_id` is set only on the
    /// loser's copy and names the loser.
    #[serde(rename = "result")]
    GameResult {
        message: GameOutcome,
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_id: Option<ConnectionId>,
    },

    HeartbeatAck { client_time: u64, server_time: u64 },

    Error {
        reason: ErrorReason,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_update_object_decodes_camel_case_payload() {
        let json = r#"{
            "event": "update-object",
            "data": {
                "sessionId": "k3j9x0",
                "objectId": "obj1",
                "position": { "x": 1.0, "y": 1.0, "z": 1.0 },
                "orientation": { "x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0 }
            }
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::UpdateObject {
                session_id: Some(SessionId::new("k3j9x0")),
                object_id: Some("obj1".into()),
                position: Some(Vec3::new(1.0, 1.0, 1.0)),
                orientation: Some(Quat::IDENTITY),
            }
        );
    }

    #[test]
    fn test_client_event_missing_session_id_decodes_as_none() {
        let json = r#"{ "event": "set-ready", "data": {} }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ClientEvent::SetReady { session_id: None });
    }

    #[test]
    fn test_client_event_create_session_defaults_display_data() {
        let json = r#"{ "event": "create-session", "data": {} }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::CreateSession {
                display_data: serde_json::Value::Null
            }
        );
    }

    #[test]
    fn test_client_event_collapse_reads_connection_id_number() {
        let json = r#"{
            "event": "collapse",
            "data": { "sessionId": "s", "causingConnectionId": 12 }
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::Collapse {
                session_id: Some(SessionId::new("s")),
                causing_connection_id: Some(ConnectionId::new(12)),
            }
        );
    }

    #[test]
    fn test_client_event_unknown_name_is_rejected() {
        let json = r#"{ "event": "fly-to-moon", "data": {} }"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_client_event_name_matches_wire_tag() {
        let event = ClientEvent::LeaveSession { session_id: None };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
    }

    #[test]
    fn test_server_event_object_updated_json_format() {
        let event = ServerEvent::ObjectUpdated {
            session_id: SessionId::new("s"),
            object_id: "obj1".into(),
            relative_position: Vec3::new(3.0, 4.0, 5.0),
            orientation: Quat::IDENTITY,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "object-updated");
        assert_eq!(json["data"]["objectId"], "obj1");
        assert_eq!(json["data"]["relativePosition"]["y"], 4.0);
        assert_eq!(json["data"]["orientation"]["w"], 1.0);
    }

    #[test]
    fn test_server_event_turn_update_json_format() {
        let event = ServerEvent::TurnUpdate {
            current_turn: ConnectionId::new(5),
            session_id: SessionId::new("s"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "turn-update");
        assert_eq!(json["data"]["currentTurn"], 5);
        assert_eq!(json["data"]["sessionId"], "s");
    }

    #[test]
    fn test_server_event_result_omits_connection_id_for_winner() {
        let won = ServerEvent::GameResult {
            message: GameOutcome::Won,
            session_id: SessionId::new("s"),
            connection_id: None,
        };
        let json = serde_json::to_value(&won).unwrap();
        assert_eq!(json["event"], "result");
        assert_eq!(json["data"]["message"], "won");
        assert!(json["data"].get("connectionId").is_none());

        let lost = ServerEvent::GameResult {
            message: GameOutcome::Lost,
            session_id: SessionId::new("s"),
            connection_id: Some(ConnectionId::new(2)),
        };
        let json = serde_json::to_value(&lost).unwrap();
        assert_eq!(json["data"]["message"], "lost");
        assert_eq!(json["data"]["connectionId"], 2);
    }

    #[test]
    fn test_server_event_error_reason_is_kebab_case() {
        let event = ServerEvent::Error {
            reason: ErrorReason::FrameNotCalibrated,
            message: "calibrate first".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["reason"], "frame-not-calibrated");
    }
}
