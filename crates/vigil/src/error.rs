//! Unified error type for Vigil.

use vigil_presence::ConnectionError;
use vigil_protocol::ProtocolError;
use vigil_session::SessionError;
use vigil_shutdown::NotificationError;
use vigil_transport::TransportError;

use crate::HttpError;

/// Top-level error that wraps every crate-specific error.
///
/// Users of the `vigil` crate deal with this single type; `#[from]` lets `?`
/// convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (token decode, credential store).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The presence channel couldn't be opened.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// An offline-notice tier failed.
    #[error(transparent)]
    Notification(#[from] NotificationError),

    /// An HTTP request to the API failed.
    #[error(transparent)]
    Http(#[from] HttpError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ChannelClosed("gone".into());
        let vigil_err: VigilError = err.into();
        assert!(matches!(vigil_err, VigilError::Transport(_)));
        assert!(vigil_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let vigil_err: VigilError = err.into();
        assert!(matches!(vigil_err, VigilError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::TokenDecode("not a jwt".into());
        let vigil_err: VigilError = err.into();
        assert!(matches!(vigil_err, VigilError::Session(_)));
    }

    #[test]
    fn test_from_connection_error() {
        let vigil_err: VigilError = ConnectionError::HandshakeTimeout.into();
        assert!(matches!(vigil_err, VigilError::Connection(_)));
        assert_eq!(vigil_err.to_string(), "presence handshake timed out");
    }

    #[test]
    fn test_from_http_error() {
        let err = HttpError::Status {
            status: 401,
            body: "expired".into(),
        };
        let vigil_err: VigilError = err.into();
        assert!(matches!(vigil_err, VigilError::Http(_)));
        assert!(vigil_err.to_string().contains("401"));
    }
}
