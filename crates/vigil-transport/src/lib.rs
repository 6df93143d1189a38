//! Transport abstraction layer for Vigil.
//!
//! Provides the [`Connector`] and [`Channel`] traits that abstract over the
//! persistent bidirectional transport a client uses to signal presence.
//! The presence layer is written against these traits, so tests can swap in
//! in-memory channels and production uses WebSocket.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a new `ChannelId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Opens new outgoing channels to the presence server.
///
/// The futures are `Send` so a connector can be driven from spawned tasks.
pub trait Connector: Send + Sync + 'static {
    /// The channel type produced by this connector.
    type Channel: Channel;

    /// Establishes a new channel.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A single open channel that can send and receive frames.
///
/// Sending and receiving must not block each other: the presence layer keeps
/// a reader task parked in [`recv`](Channel::recv) for the lifetime of the
/// channel while other tasks send heartbeats and the offline notice.
pub trait Channel: Send + Sync + 'static {
    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the channel is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the channel.
    ///
    /// A channel that the remote end already closed counts as closed; this
    /// returns `Ok(())` in that case.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this channel.
    fn id(&self) -> ChannelId;
}
