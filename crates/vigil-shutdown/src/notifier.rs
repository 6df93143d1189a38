//! The shutdown notifier: walks the delivery tiers in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use vigil_protocol::{DisconnectNotice, UserId};

use crate::{
    Beacon, BlockingTransport, DeliveryTier, GracefulChannel, NotificationError, ShutdownTrigger,
    TierKind,
};

/// Everything a single `notify` call needs to know about the session.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownContext<'a> {
    pub trigger: ShutdownTrigger,
    /// The session's user. `None` means no session was ever established.
    pub user: Option<&'a UserId>,
    /// Bearer token for the blocking request, if the session has one.
    pub bearer: Option<&'a str>,
}

/// What a `notify` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Nothing to do: no session identity, or this session was already
    /// notified.
    Skipped,
    /// The notice went out through this tier.
    Delivered(TierKind),
    /// Every applicable tier failed.
    Exhausted,
}

/// Delivers the offline notice through an ordered list of tiers.
///
/// The notifier is a one-shot per session: [`arm`](Self::arm) it when the
/// session goes online, and the first [`notify`](Self::notify) disarms it.
/// Teardown and termination can both fire for the same session; the second
/// call finds the notifier disarmed and returns [`NotifyOutcome::Skipped`],
/// so the server sees at most one notice.
#[derive(Debug)]
pub struct ShutdownNotifier {
    tiers: Vec<DeliveryTier>,
    disconnect_url: String,
    armed: AtomicBool,
}

impl ShutdownNotifier {
    /// Starts building a notifier that posts to `disconnect_url`.
    pub fn builder(disconnect_url: impl Into<String>) -> ShutdownNotifierBuilder {
        ShutdownNotifierBuilder {
            disconnect_url: disconnect_url.into(),
            beacon: None,
            blocking: None,
        }
    }

    /// Arms the notifier for a newly established session.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// The endpoint out-of-band notices are sent to.
    pub fn disconnect_url(&self) -> &str {
        &self.disconnect_url
    }

    /// The tier order, first to last.
    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(DeliveryTier::kind).collect()
    }

    /// Delivers the offline notice for `ctx.user`.
    ///
    /// Tries each tier whose precondition holds, in order, until one
    /// succeeds. Tier failures are logged and never returned.
    ///
    /// A teardown only ever closes the channel; it never touches the spool
    /// or blocks the runtime. Those tiers belong to termination.
    pub async fn notify<G: GracefulChannel>(
        &self,
        ctx: &ShutdownContext<'_>,
        channel: &G,
    ) -> NotifyOutcome {
        let Some(user) = ctx.user else {
            tracing::debug!(trigger = %ctx.trigger, "no session identity, nothing to notify");
            return NotifyOutcome::Skipped;
        };

        if !self.armed.swap(false, Ordering::AcqRel) {
            tracing::debug!(%user, trigger = %ctx.trigger, "offline notice already handled");
            return NotifyOutcome::Skipped;
        }

        let body = match serde_json::to_vec(&DisconnectNotice { id: user.clone() }) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(%user, error = %NotificationError::Encode(e), "cannot build offline notice");
                return NotifyOutcome::Exhausted;
            }
        };

        for tier in &self.tiers {
            let kind = tier.kind();
            if !tier.precondition(ctx.trigger) {
                tracing::trace!(tier = %kind, "tier precondition unmet, skipping");
                continue;
            }

            let result = match tier {
                DeliveryTier::ChannelClose => {
                    if !channel.is_open() {
                        tracing::debug!(%user, "channel already closed by the remote end");
                    }
                    channel.close_gracefully(user).await
                }
                DeliveryTier::Beacon(beacon) => beacon.send_beacon(&self.disconnect_url, &body),
                DeliveryTier::Blocking(transport) => {
                    transport.post_blocking(&self.disconnect_url, &body, ctx.bearer)
                }
            };

            match result {
                Ok(()) => {
                    tracing::info!(%user, tier = %kind, trigger = %ctx.trigger, "offline notice delivered");
                    return NotifyOutcome::Delivered(kind);
                }
                Err(e) => {
                    tracing::warn!(%user, tier = %kind, error = %e, "offline notice tier failed");
                }
            }
        }

        tracing::warn!(%user, trigger = %ctx.trigger, "no tier delivered the offline notice");
        NotifyOutcome::Exhausted
    }
}

/// Builder for [`ShutdownNotifier`].
///
/// The tier order is fixed: `ChannelClose`, then the beacon (if set), then
/// the blocking transport (if set). Only which tiers exist is configurable.
pub struct ShutdownNotifierBuilder {
    disconnect_url: String,
    beacon: Option<Arc<dyn Beacon>>,
    blocking: Option<Arc<dyn BlockingTransport>>,
}

impl ShutdownNotifierBuilder {
    /// Adds the durable fire-and-forget tier.
    pub fn beacon(mut self, beacon: Arc<dyn Beacon>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// Adds the synchronous last-resort tier.
    pub fn blocking(mut self, transport: Arc<dyn BlockingTransport>) -> Self {
        self.blocking = Some(transport);
        self
    }

    pub fn build(self) -> ShutdownNotifier {
        let mut tiers = vec![DeliveryTier::ChannelClose];
        tiers.extend(self.beacon.map(DeliveryTier::Beacon));
        tiers.extend(self.blocking.map(DeliveryTier::Blocking));

        ShutdownNotifier {
            tiers,
            disconnect_url: self.disconnect_url,
            armed: AtomicBool::new(false),
        }
    }
}
