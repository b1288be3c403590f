//! # Stackforge
//!
//! Realtime session coordinator for two-player block-stacking games.
//!
//! Two clients, each in its own device coordinate frame, share one session:
//! the server translates every block pose into the session's shared frame,
//! enforces turn order, and announces the winner when the tower falls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stackforge::prelude::*;
//!
//! # async fn start() -> Result<(), StackforgeError> {
//! let server = StackforgeServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod dispatcher;
mod error;
mod handler;
mod server;

pub use dispatcher::Dispatcher;
pub use error::StackforgeError;
pub use server::{StackforgeServer, StackforgeServerBuilder};

/// Everything needed to run a server or drive the dispatcher directly.
pub mod prelude {
    pub use crate::{
        Dispatcher, StackforgeError, StackforgeServer, StackforgeServerBuilder,
    };
    pub use stackforge_protocol::{
        ClientEvent, Codec, ConnectionId, ErrorReason, GameOutcome, JsonCodec,
        Quat, ServerEvent, SessionId, SessionPhase, SessionSnapshot,
        TrackedObject, Vec3,
    };
    pub use stackforge_session::{DirectoryConfig, Mailbox};
}
