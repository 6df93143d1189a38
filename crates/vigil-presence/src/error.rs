//! Error types for the presence layer.

use vigil_protocol::ProtocolError;
use vigil_transport::TransportError;

/// Why `open` failed. The connection is back in `Disconnected` whenever one
/// of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame couldn't be encoded or the server sent garbage.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered the registration with an error frame.
    #[error("registration rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// No `Registered` ack within the handshake timeout.
    #[error("presence handshake timed out")]
    HandshakeTimeout,

    /// The server closed the channel before acknowledging registration.
    #[error("channel closed during handshake")]
    ClosedDuringHandshake,

    /// The `open` was superseded before it could finish (the connection was
    /// abandoned while the handshake was in flight).
    #[error("open aborted")]
    Aborted,
}
