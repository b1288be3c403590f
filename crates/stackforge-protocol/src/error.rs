//! Error types for the protocol layer.
//!
//! Each crate in Stackforge defines its own error enum. A `ProtocolError`
//! always means the problem is in turning events into bytes or back, not in
//! networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown event name, or a
    /// field of the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
