//! Core wire types shared by every layer: identifiers, poses, and the
//! session snapshot handed to a joining client.

use std::fmt;
use std::ops::Sub;

use serde::{Deserialize, Serialize};
use stackforge_transport::ConnectionId;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A short opaque session identifier, generated by the server.
///
/// Serialized as a plain JSON string so clients can show it as a join code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arbitrary client-supplied presentation data (name, color, avatar).
///
/// The server never interprets it; it is relayed verbatim to the other
/// participant.
pub type DisplayData = serde_json::Value;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A position or translation in some coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Component-wise subtraction.
impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// An orientation quaternion. Relayed as-is; the server does no rotation
/// math on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A game piece whose pose is relayed between participants.
///
/// `position` is always expressed in the shared session frame, never in a
/// device's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: String,
    pub position: Vec3,
    pub orientation: Quat,
}

// ---------------------------------------------------------------------------
// Session state as seen by clients
// ---------------------------------------------------------------------------

/// Lifecycle phase of a session.
///
/// ```text
/// Forming → AwaitingReady → InPlay → Resolved
/// ```
///
/// Destruction when the last participant departs can happen from any
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    /// Fewer than two participants.
    Forming,
    /// Two participants, not everyone has signalled ready.
    AwaitingReady,
    /// Both ready; turn rotation is active.
    InPlay,
    /// A collapse was reported. Terminal.
    Resolved,
}

impl SessionPhase {
    /// Whether turn order is currently enforced.
    pub fn is_in_play(&self) -> bool {
        matches!(self, Self::InPlay)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forming => write!(f, "Forming"),
            Self::AwaitingReady => write!(f, "AwaitingReady"),
            Self::InPlay => write!(f, "InPlay"),
            Self::Resolved => write!(f, "Resolved"),
        }
    }
}

/// Public view of one participant. Frame offsets stay server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub connection_id: ConnectionId,
    pub display_data: DisplayData,
    pub ready: bool,
    pub calibrated: bool,
}

/// Full session state, sent to a client when it joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub phase: SessionPhase,
    pub participants: Vec<ParticipantInfo>,
    pub tracked_objects: Vec<TrackedObject>,
    /// Whose turn it is, once the game has started.
    pub current_turn: Option<ConnectionId>,
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an outbound event within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every current participant.
    All,
    /// One specific connection.
    Connection(ConnectionId),
    /// Every participant except the given one.
    AllExcept(ConnectionId),
}
