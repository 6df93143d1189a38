//! Offline-notice delivery for process shutdown.
//!
//! When a client goes away, the server should learn that its user is
//! offline. On an orderly teardown that's easy: send a `GoingOffline` frame
//! over the presence channel and close it. When the process is being
//! terminated, async I/O may be cut off mid-flight, so the notifier falls
//! back through an ordered list of delivery tiers:
//!
//! ```text
//! Teardown:   ChannelClose
//!              async frame
//!
//! Terminate:  Beacon ──(unavailable/failed)──→ Blocking
//!             durable spool                    sync POST
//! ```
//!
//! Each tier has a precondition; tiers whose precondition is unmet are
//! skipped, and the first tier that succeeds ends the walk. A teardown never
//! reaches the spool or the blocking request, so a process that keeps
//! running is never frozen by a shutdown notice.
//!
//! # Integration
//!
//! The presence connection implements [`GracefulChannel`]; the controller
//! calls [`ShutdownNotifier::notify`] from both of its shutdown triggers:
//!
//! ```ignore
//! let ctx = ShutdownContext { trigger, user: Some(&user_id), bearer: Some(&token) };
//! match notifier.notify(&ctx, &presence).await {
//!     NotifyOutcome::Delivered(tier) => { /* done */ }
//!     NotifyOutcome::Skipped | NotifyOutcome::Exhausted => { /* nothing left to do */ }
//! }
//! ```

mod blocking;
mod error;
mod notifier;
mod spool;
mod tier;

pub use blocking::{BlockingTransport, HttpBlockingTransport};
pub use error::NotificationError;
pub use notifier::{NotifyOutcome, ShutdownContext, ShutdownNotifier, ShutdownNotifierBuilder};
pub use spool::{SpoolBeacon, SpooledNotice};
pub use tier::{Beacon, DeliveryTier, GracefulChannel, ShutdownTrigger, TierKind};
