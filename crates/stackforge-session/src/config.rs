//! Session directory configuration.

use serde::{Deserialize, Serialize};

/// Settings for the [`SessionDirectory`](crate::SessionDirectory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Length of generated session ids, in base-36 characters.
    ///
    /// Six characters give about 2 billion ids, plenty for live sessions,
    /// and are still easy to type on a phone. Clamped to
    /// [`MIN_ID_LENGTH`](crate::MIN_ID_LENGTH)..=[`MAX_ID_LENGTH`](crate::MAX_ID_LENGTH).
    pub id_length: usize,

    /// Capacity of each session actor's command queue. Senders wait when
    /// it is full.
    pub command_buffer: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            id_length: 6,
            command_buffer: 64,
        }
    }
}
