//! State machine types shared by the presence connection and the controller.

use std::fmt;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The state of the presence channel.
///
/// ```text
///   Disconnected ──open()──→ Connecting ──registered──→ Online
///        ↑                       │                        │
///        └──────(failure)────────┘                     close()
///        │                                                ↓
///        └──────────────(channel closed)──────────── Disconnecting
/// ```
///
/// `Online → Disconnected` also happens directly when the server drops the
/// channel or the process abandons it during termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel. The only state `open` acts on.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Registered with the server; the user is online.
    Online,
    /// Offline notice being sent, channel being closed.
    Disconnecting,
}

impl ConnectionState {
    /// The derived boolean the UI renders from.
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ControllerPhase
// ---------------------------------------------------------------------------

/// The session controller's lifecycle.
///
/// ```text
/// Idle → Validating → Active → Terminating → Idle
///            │
///            └──(no/expired token, open failed)──→ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerPhase {
    #[default]
    Idle,
    Validating,
    Active,
    Terminating,
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Active => "active",
            Self::Terminating => "terminating",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_only_online_is_online() {
        assert!(ConnectionState::Online.is_online());
        for s in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Disconnecting,
        ] {
            assert!(!s.is_online(), "{s} should not render as online");
        }
    }

    #[test]
    fn test_controller_phase_default_is_idle() {
        assert_eq!(ControllerPhase::default(), ControllerPhase::Idle);
    }
}
