//! Wire protocol for Stackforge.
//!
//! - **Types** ([`Vec3`], [`Quat`], [`TrackedObject`], [`SessionSnapshot`],
//!   [`Recipient`]): the data structures that travel on the wire.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): the named messages
//!   clients and server exchange.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (events) → Session (game state)
//! ```

mod codec;
mod error;
mod events;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use events::{ClientEvent, ErrorReason, GameOutcome, ServerEvent};
pub use stackforge_transport::ConnectionId;
pub use types::{
    DisplayData, ParticipantInfo, Quat, Recipient, SessionId, SessionPhase,
    SessionSnapshot, TrackedObject, Vec3,
};
