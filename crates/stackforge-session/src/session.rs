//! The authoritative state of one two-player game.
//!
//! [`Session`] is plain data plus synchronous state transitions. It knows
//! nothing about channels or tasks; the session actor owns exactly one and
//! applies every operation to it in arrival order.

use std::collections::BTreeMap;

use stackforge_protocol::{
    ConnectionId, DisplayData, ParticipantInfo, Quat, SessionId, SessionPhase,
    SessionSnapshot, TrackedObject, Vec3,
};

use crate::SessionError;

/// A session never holds more than this many participants.
pub const MAX_PARTICIPANTS: usize = 2;

/// One member of a session.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_data: DisplayData,
    /// Translation from this participant's device origin to the shared
    /// session origin. `None` until calibrated.
    pub base_frame_offset: Option<Vec3>,
    /// Set by an explicit signal only; never cleared.
    pub ready: bool,
}

impl Participant {
    fn new(connection_id: ConnectionId, display_data: DisplayData) -> Self {
        Self {
            connection_id,
            display_data,
            base_frame_offset: None,
            ready: false,
        }
    }

    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            connection_id: self.connection_id,
            display_data: self.display_data.clone(),
            ready: self.ready,
            calibrated: self.base_frame_offset.is_some(),
        }
    }
}

/// Result of a successful object update.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMove {
    /// The object as stored, in the shared session frame.
    pub object: TrackedObject,
    /// Whose turn it is now.
    pub next_turn: ConnectionId,
}

/// What is left of the session after a participant departs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Nobody is left; the session must be destroyed.
    Emptied,
    /// One participant remains and must be told.
    Remaining(ConnectionId),
}

/// Win/loss assignment after a collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseOutcome {
    pub loser: ConnectionId,
    pub winners: Vec<ConnectionId>,
}

/// Authoritative state for one game.
///
/// Invariants:
/// - `participants.len() <= MAX_PARTICIPANTS`
/// - `turn_index < participants.len()` whenever there are participants
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    /// Join order matters: `participants[0]` moves first.
    participants: Vec<Participant>,
    tracked_objects: BTreeMap<String, TrackedObject>,
    turn_index: usize,
    started: bool,
    resolved: bool,
}

impl Session {
    /// Creates a session with `creator` as its only participant.
    pub fn new(
        id: SessionId,
        creator: ConnectionId,
        display_data: DisplayData,
    ) -> Self {
        Self {
            id,
            participants: vec![Participant::new(creator, display_data)],
            tracked_objects: BTreeMap::new(),
            turn_index: 0,
            started: false,
            resolved: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Connection ids of all participants, in join order.
    pub fn participant_ids(&self) -> Vec<ConnectionId> {
        self.participants.iter().map(|p| p.connection_id).collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, conn_id: ConnectionId) -> bool {
        self.index_of(conn_id).is_some()
    }

    fn index_of(&self, conn_id: ConnectionId) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.connection_id == conn_id)
    }

    fn participant_mut(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<&mut Participant, SessionError> {
        let id = self.id.clone();
        self.participants
            .iter_mut()
            .find(|p| p.connection_id == conn_id)
            .ok_or(SessionError::NotAParticipant(conn_id, id))
    }

    /// Two participants, both ready.
    pub fn all_ready(&self) -> bool {
        self.participants.len() == MAX_PARTICIPANTS
            && self.participants.iter().all(|p| p.ready)
    }

    pub fn phase(&self) -> SessionPhase {
        if self.resolved {
            SessionPhase::Resolved
        } else if self.participants.len() == MAX_PARTICIPANTS {
            if self.started {
                SessionPhase::InPlay
            } else {
                SessionPhase::AwaitingReady
            }
        } else {
            SessionPhase::Forming
        }
    }

    /// Whose turn it is. `None` until the game has started.
    pub fn current_turn(&self) -> Option<ConnectionId> {
        if !self.started {
            return None;
        }
        self.participants.get(self.turn_index).map(|p| p.connection_id)
    }

    /// All tracked objects, ordered by id.
    pub fn tracked_objects(&self) -> Vec<TrackedObject> {
        self.tracked_objects.values().cloned().collect()
    }

    pub fn tracked_object(&self, object_id: &str) -> Option<&TrackedObject> {
        self.tracked_objects.get(object_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase(),
            participants: self.participants.iter().map(Participant::info).collect(),
            tracked_objects: self.tracked_objects(),
            current_turn: self.current_turn(),
        }
    }

    /// Adds a participant and returns the state they should see.
    ///
    /// Joining a session one already belongs to changes nothing.
    ///
    /// # Errors
    /// [`SessionError::Full`] if two participants are already present.
    pub fn join(
        &mut self,
        conn_id: ConnectionId,
        display_data: DisplayData,
    ) -> Result<SessionSnapshot, SessionError> {
        if !self.contains(conn_id) {
            if self.participants.len() >= MAX_PARTICIPANTS {
                return Err(SessionError::Full(self.id.clone()));
            }
            self.participants.push(Participant::new(conn_id, display_data));
        }
        Ok(self.snapshot())
    }

    /// Records the participant's frame offset. Re-calibrating overwrites.
    pub fn set_base_frame(
        &mut self,
        conn_id: ConnectionId,
        offset: Vec3,
    ) -> Result<(), SessionError> {
        self.participant_mut(conn_id)?.base_frame_offset = Some(offset);
        Ok(())
    }

    /// Marks the participant ready.
    ///
    /// Returns `true` exactly when this call starts the game: both
    /// participants are now ready and play had not started. The turn
    /// pointer is then reset so `participants[0]` moves first.
    pub fn set_ready(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<bool, SessionError> {
        self.participant_mut(conn_id)?.ready = true;

        if self.started || self.resolved || !self.all_ready() {
            return Ok(false);
        }
        self.started = true;
        self.turn_index = 0;
        Ok(true)
    }

    /// Stores an object pose sent in the participant's local frame.
    ///
    /// The position is translated into the shared frame by subtracting the
    /// sender's own offset, and the turn passes to the next participant.
    ///
    /// # Errors
    /// Checked in this order: [`SessionError::NotAParticipant`],
    /// [`SessionError::FrameNotCalibrated`], [`SessionError::AlreadyResolved`],
    /// and, while in play, [`SessionError::OutOfTurn`]. A failed update
    /// leaves the session unchanged.
    pub fn update_object(
        &mut self,
        conn_id: ConnectionId,
        object_id: String,
        absolute_position: Vec3,
        orientation: Quat,
    ) -> Result<ObjectMove, SessionError> {
        let index = self
            .index_of(conn_id)
            .ok_or_else(|| SessionError::NotAParticipant(conn_id, self.id.clone()))?;
        let offset = self.participants[index]
            .base_frame_offset
            .ok_or(SessionError::FrameNotCalibrated(conn_id))?;
        if self.resolved {
            return Err(SessionError::AlreadyResolved(self.id.clone()));
        }
        if self.phase().is_in_play() && index != self.turn_index {
            return Err(SessionError::OutOfTurn {
                sender: conn_id,
                current: self.participants[self.turn_index].connection_id,
            });
        }

        let object = TrackedObject {
            id: object_id.clone(),
            position: absolute_position - offset,
            orientation,
        };
        self.tracked_objects.insert(object_id, object.clone());

        self.turn_index = (index + 1) % self.participants.len();
        let next_turn = self.participants[self.turn_index].connection_id;
        Ok(ObjectMove { object, next_turn })
    }

    /// Removes a participant.
    ///
    /// If one participant remains, the turn passes to them and the session
    /// drops back to forming; play restarts once a new opponent joins and
    /// both are ready.
    pub fn depart(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<Departure, SessionError> {
        let index = self
            .index_of(conn_id)
            .ok_or_else(|| SessionError::NotAParticipant(conn_id, self.id.clone()))?;
        self.participants.remove(index);
        self.turn_index = 0;
        self.started = false;

        Ok(match self.participants.first() {
            Some(remaining) => Departure::Remaining(remaining.connection_id),
            None => Departure::Emptied,
        })
    }

    /// Assigns the loss to `causing` and the win to everyone else present.
    ///
    /// Pure: does not change the session.
    ///
    /// # Errors
    /// [`SessionError::NotAParticipant`] if `causing` is not a member.
    pub fn resolve_collapse(
        &self,
        causing: ConnectionId,
    ) -> Result<CollapseOutcome, SessionError> {
        if !self.contains(causing) {
            return Err(SessionError::NotAParticipant(causing, self.id.clone()));
        }
        Ok(CollapseOutcome {
            loser: causing,
            winners: self
                .participants
                .iter()
                .map(|p| p.connection_id)
                .filter(|id| *id != causing)
                .collect(),
        })
    }

    /// Moves the session into its terminal phase.
    pub fn mark_resolved(&mut self) {
        self.resolved = true;
    }
}
