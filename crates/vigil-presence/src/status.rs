//! Read-only presence status for UI code.

use tokio::sync::watch;
use vigil_session::ConnectionState;

/// An observer of a [`PresenceConnection`](crate::PresenceConnection)'s
/// state. Cheap to clone; holds no reference to the connection itself.
#[derive(Debug, Clone)]
pub struct PresenceStatus {
    rx: watch::Receiver<ConnectionState>,
}

impl PresenceStatus {
    pub(crate) fn new(rx: watch::Receiver<ConnectionState>) -> Self {
        Self { rx }
    }

    /// Whether the user currently shows as online.
    pub fn is_online(&self) -> bool {
        self.rx.borrow().is_online()
    }

    pub fn state(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Waits for the next state change and returns the new state.
    ///
    /// Returns `None` once the connection has been dropped.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Waits until the state satisfies `f`.
    ///
    /// Returns `None` if the connection is dropped first.
    pub async fn wait_for(
        &mut self,
        mut f: impl FnMut(ConnectionState) -> bool,
    ) -> Option<ConnectionState> {
        self.rx.wait_for(|s| f(*s)).await.ok().map(|s| *s)
    }
}
