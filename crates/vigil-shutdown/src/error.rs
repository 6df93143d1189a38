//! Error types for offline-notice delivery.

/// A single delivery tier failed to get the offline notice out.
///
/// These are never propagated to the caller of
/// [`ShutdownNotifier::notify`](crate::ShutdownNotifier::notify): the
/// notifier logs them and moves on to the next tier, because during
/// shutdown there is nobody left to react.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The `GoingOffline` frame couldn't be written to the channel.
    #[error("channel notice failed: {0}")]
    ChannelNotice(String),

    /// The durable spool couldn't be written.
    #[error("spool write failed: {0}")]
    Spool(#[source] std::io::Error),

    /// The notice body couldn't be serialized.
    #[error("notice encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The blocking request failed before a response arrived.
    #[error("blocking request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("disconnect endpoint returned HTTP {0}")]
    Status(u16),

    /// The thread carrying the blocking request couldn't be spawned.
    #[error("failed to spawn notice thread: {0}")]
    Thread(#[source] std::io::Error),

    /// The thread carrying the blocking request panicked.
    #[error("notice thread panicked")]
    ThreadPanicked,
}
