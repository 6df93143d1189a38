//! Error types for the protocol layer.
//!
//! Each crate in Vigil defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in serialization, not in
//! networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, or a frame
    /// truncated by a dying connection.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded fine but breaks protocol rules, e.g. the server
    /// answered a `Register` with something other than `Registered`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
