//! Connection registry for Stackforge.
//!
//! Tracks every live connection and the one session (if any) it is
//! participating in. The registry stores identifiers only; the transport
//! handle used for sending lives with the connection task.
//!
//! ```text
//! Session Layer (above)  ← asks which session a connection belongs to
//!     ↕
//! Registry (this crate)  ← ConnectionId → Option<SessionId>
//!     ↕
//! Protocol Layer (below) ← provides ConnectionId, SessionId
//! ```

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::ConnectionRegistry;
