//! Delivery tiers and the traits they deliver through.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use vigil_protocol::UserId;

use crate::{BlockingTransport, NotificationError};

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Why the session is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// Ordinary teardown: the owner is going away but the runtime keeps
    /// running, so async delivery can still complete.
    Teardown,
    /// The process received a termination signal. Async delivery may be cut
    /// off at any await point.
    Terminate,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teardown => f.write_str("teardown"),
            Self::Terminate => f.write_str("terminate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery mechanisms
// ---------------------------------------------------------------------------

/// The presence channel, seen from the notifier.
pub trait GracefulChannel: Send + Sync {
    /// `true` while a `GoingOffline` frame can still be written.
    fn is_open(&self) -> bool;

    /// Sends the offline notice and closes the channel.
    ///
    /// A channel the remote end already closed counts as success.
    fn close_gracefully(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

/// A fire-and-forget mechanism that survives the process going away.
///
/// `send_beacon` must not block on the network: it queues the notice
/// somewhere durable and returns.
pub trait Beacon: Send + Sync {
    /// Whether the mechanism can be used right now.
    fn is_available(&self) -> bool;

    /// Queues `body` for delivery to `url`.
    fn send_beacon(&self, url: &str, body: &[u8]) -> Result<(), NotificationError>;
}

// ---------------------------------------------------------------------------
// DeliveryTier
// ---------------------------------------------------------------------------

/// The kind of a tier, for logs and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    ChannelClose,
    Beacon,
    Blocking,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelClose => f.write_str("channel-close"),
            Self::Beacon => f.write_str("beacon"),
            Self::Blocking => f.write_str("blocking"),
        }
    }
}

/// One entry in the notifier's ordered fallback list.
#[derive(Clone)]
pub enum DeliveryTier {
    /// Graceful close of the presence channel. Teardown only.
    ChannelClose,
    /// Durable fire-and-forget delivery. Termination only.
    Beacon(Arc<dyn Beacon>),
    /// Synchronous request that completes before `notify` returns.
    /// Termination only.
    Blocking(Arc<dyn BlockingTransport>),
}

impl DeliveryTier {
    pub fn kind(&self) -> TierKind {
        match self {
            Self::ChannelClose => TierKind::ChannelClose,
            Self::Beacon(_) => TierKind::Beacon,
            Self::Blocking(_) => TierKind::Blocking,
        }
    }

    /// Whether this tier may be attempted.
    ///
    /// - `ChannelClose`: teardown only. A channel the remote end already
    ///   closed is still attempted, and counts as delivered.
    /// - `Beacon`: termination only, when the mechanism is available.
    /// - `Blocking`: termination only; it is the last resort and the one
    ///   place the runtime is allowed to block.
    pub fn precondition(&self, trigger: ShutdownTrigger) -> bool {
        match self {
            Self::ChannelClose => trigger == ShutdownTrigger::Teardown,
            Self::Beacon(beacon) => trigger == ShutdownTrigger::Terminate && beacon.is_available(),
            Self::Blocking(_) => trigger == ShutdownTrigger::Terminate,
        }
    }
}

impl fmt::Debug for DeliveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeliveryTier({})", self.kind())
    }
}
