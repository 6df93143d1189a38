//! The presence connection: one channel per session, kept in step with
//! [`ConnectionState`].
//!
//! # Lifecycle
//!
//! ```text
//! open(user) ──claim──→ Connecting ──connect + Register/Registered──→ Online
//!                           │                                          │
//!                      (any failure)                              close(user)
//!                           ↓                                          ↓
//!                      Disconnected ←──────channel closed───── Disconnecting
//! ```
//!
//! Two more paths lead back to `Disconnected` from `Online`:
//!
//! - the **monitor** task sees the server close the channel (or a read
//!   fail) and releases it, so the status silently degrades to offline;
//! - [`abandon`](PresenceConnection::abandon) drops the channel without a
//!   notice during process termination.
//!
//! # Epochs
//!
//! Every claim (`open`, `close`, `abandon`) bumps an epoch stored next to
//! the live channel under one mutex. A stale `open`, a stale monitor, or a
//! cancelled call compares its epoch before touching shared state, so it can
//! never clobber a newer channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vigil_protocol::{
    Codec, Envelope, JsonCodec, PROTOCOL_VERSION, PresenceMessage, ProtocolError, UserId,
};
use vigil_session::{ConnectionState, now_millis};
use vigil_shutdown::{GracefulChannel, NotificationError};
use vigil_transport::{Channel, Connector, TransportError};

use crate::{ConnectionError, PresenceConfig, PresenceStatus};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// An established channel and the task watching it.
struct Live<C> {
    user: UserId,
    channel: Arc<C>,
    monitor: Option<JoinHandle<()>>,
}

impl<C> Live<C> {
    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

struct Slot<C> {
    epoch: u64,
    live: Option<Live<C>>,
}

/// State shared between the connection and its monitor task.
struct Shared<C> {
    state: watch::Sender<ConnectionState>,
    slot: Mutex<Slot<C>>,
    seq: AtomicU64,
    codec: JsonCodec,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Slot<C>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wraps a message in the next envelope and encodes it.
    fn frame(&self, message: PresenceMessage) -> Result<Vec<u8>, ProtocolError> {
        self.codec.encode(&Envelope {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: now_millis(),
            message,
        })
    }

    /// Moves `from → Disconnected` if `epoch` is still current.
    fn settle(&self, epoch: u64, from: ConnectionState) {
        let slot = self.lock();
        if slot.epoch == epoch {
            self.state.send_if_modified(|s| {
                if *s == from {
                    *s = ConnectionState::Disconnected;
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Called by the monitor when its channel is gone.
    fn release(&self, epoch: u64) {
        let live = {
            let mut slot = self.lock();
            if slot.epoch != epoch {
                return;
            }
            let live = slot.live.take();
            if live.is_some() {
                self.state.send_replace(ConnectionState::Disconnected);
            }
            live
        };
        if let Some(live) = live {
            tracing::info!(user_id = %live.user, "presence channel lost, now offline");
        }
    }
}

/// Resets a claimed state back to `Disconnected` when the claiming call ends
/// without finishing, including when its future is dropped mid-await.
struct ClaimGuard<C> {
    shared: Arc<Shared<C>>,
    epoch: u64,
    from: ConnectionState,
    armed: bool,
}

impl<C> Drop for ClaimGuard<C> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.settle(self.epoch, self.from);
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceConnection
// ---------------------------------------------------------------------------

/// How a `close` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// There was no channel to close.
    AlreadyClosed,
    /// The `GoingOffline` frame was written before the channel closed.
    NoticeSent,
    /// The channel closed, but the frame didn't make it out.
    NoticeUndelivered,
}

/// Maintains at most one presence channel and the state that mirrors it.
///
/// All methods take `&self`; concurrent calls are serialized by the state
/// claims described in the module docs.
pub struct PresenceConnection<K: Connector> {
    connector: K,
    config: PresenceConfig,
    shared: Arc<Shared<K::Channel>>,
}

impl<K: Connector> PresenceConnection<K> {
    pub fn new(connector: K, config: PresenceConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            config: config.validated(),
            shared: Arc::new(Shared {
                state,
                slot: Mutex::new(Slot {
                    epoch: 0,
                    live: None,
                }),
                seq: AtomicU64::new(0),
                codec: JsonCodec,
            }),
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// The user the live channel was registered for.
    pub fn user(&self) -> Option<UserId> {
        self.shared.lock().live.as_ref().map(|live| live.user.clone())
    }

    /// A status observer for UI code.
    pub fn status(&self) -> PresenceStatus {
        PresenceStatus::new(self.shared.state.subscribe())
    }

    /// Opens the presence channel for `user` and registers with the server.
    ///
    /// A no-op returning `Ok(())` unless the connection is `Disconnected`:
    /// a concurrent `open` never creates a second channel.
    ///
    /// # Errors
    /// Any [`ConnectionError`]; the state is `Disconnected` afterwards.
    /// Nothing is retried.
    pub async fn open(&self, user: UserId) -> Result<(), ConnectionError> {
        let epoch = {
            let mut slot = self.shared.lock();
            let current = self.shared.current();
            if current != ConnectionState::Disconnected {
                tracing::debug!(%user, state = %current, "open ignored, channel already claimed");
                return Ok(());
            }
            slot.epoch += 1;
            self.shared.state.send_replace(ConnectionState::Connecting);
            slot.epoch
        };
        let mut guard = ClaimGuard {
            shared: Arc::clone(&self.shared),
            epoch,
            from: ConnectionState::Connecting,
            armed: true,
        };

        tracing::debug!(%user, "opening presence channel");
        let channel = match tokio::time::timeout(
            self.config.handshake_timeout,
            self.handshake(&user),
        )
        .await
        {
            Ok(Ok(channel)) => Arc::new(channel),
            Ok(Err(e)) => {
                tracing::warn!(%user, error = %e, "presence open failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(%user, timeout = ?self.config.handshake_timeout, "presence handshake timed out");
                return Err(ConnectionError::HandshakeTimeout);
            }
        };

        let channel_id = channel.id();
        {
            let mut slot = self.shared.lock();
            if slot.epoch == epoch {
                // Spawned under the lock: the monitor's release can't run
                // before the slot is filled.
                let monitor = tokio::spawn(monitor(
                    Arc::clone(&self.shared),
                    Arc::clone(&channel),
                    epoch,
                    self.config.heartbeat_interval,
                ));
                slot.live = Some(Live {
                    user: user.clone(),
                    channel,
                    monitor: Some(monitor),
                });
                self.shared.state.send_replace(ConnectionState::Online);
                guard.armed = false;
                tracing::info!(%user, %channel_id, "presence online");
                return Ok(());
            }
        }

        tracing::debug!(%user, %channel_id, "open superseded, discarding channel");
        if let Err(e) = channel.close().await {
            tracing::debug!(%channel_id, error = %e, "close of discarded channel failed");
        }
        Err(ConnectionError::Aborted)
    }

    /// Connects and runs the Register/Registered exchange.
    async fn handshake(&self, user: &UserId) -> Result<K::Channel, ConnectionError> {
        let channel = self.connector.connect().await?;
        let register = self.shared.frame(PresenceMessage::Register {
            user_id: user.clone(),
            session_nonce: session_nonce(),
            version: PROTOCOL_VERSION,
        })?;
        channel.send(&register).await?;

        loop {
            let Some(bytes) = channel.recv().await? else {
                return Err(ConnectionError::ClosedDuringHandshake);
            };
            let envelope: Envelope = self.shared.codec.decode(&bytes)?;
            match envelope.message {
                PresenceMessage::Registered { user_id, .. } => {
                    if &user_id != user {
                        tracing::warn!(expected = %user, got = %user_id, "server registered a different user id");
                    }
                    return Ok(channel);
                }
                PresenceMessage::Error { code, message } => {
                    return Err(ConnectionError::Rejected { code, message });
                }
                other => {
                    tracing::trace!(frame = ?other, "ignoring frame during handshake");
                }
            }
        }
    }

    /// Announces `user` as offline and closes the channel.
    ///
    /// Waits out an in-flight `open` or `close` first. The notice is best
    /// effort: a send failure or timeout still closes the channel and
    /// reports [`CloseOutcome::NoticeUndelivered`].
    pub async fn close(&self, user: &UserId) -> CloseOutcome {
        let mut rx = self.shared.state.subscribe();
        let (epoch, mut live) = loop {
            {
                let mut slot = self.shared.lock();
                match self.shared.current() {
                    ConnectionState::Disconnected => return CloseOutcome::AlreadyClosed,
                    ConnectionState::Online => {
                        slot.epoch += 1;
                        let epoch = slot.epoch;
                        let live = slot.live.take();
                        self.shared
                            .state
                            .send_replace(ConnectionState::Disconnecting);
                        match live {
                            Some(live) => break (epoch, live),
                            None => {
                                self.shared
                                    .state
                                    .send_replace(ConnectionState::Disconnected);
                                return CloseOutcome::AlreadyClosed;
                            }
                        }
                    }
                    ConnectionState::Connecting | ConnectionState::Disconnecting => {}
                }
            }
            tracing::debug!(%user, "close waiting for in-flight transition");
            if rx
                .wait_for(|s| {
                    matches!(s, ConnectionState::Online | ConnectionState::Disconnected)
                })
                .await
                .is_err()
            {
                return CloseOutcome::AlreadyClosed;
            }
        };
        let _guard = ClaimGuard {
            shared: Arc::clone(&self.shared),
            epoch,
            from: ConnectionState::Disconnecting,
            armed: true,
        };

        live.stop_monitor();
        if &live.user != user {
            tracing::warn!(registered = %live.user, closing = %user, "closing presence for a different user id");
        }
        let channel_id = live.channel.id();

        let notice = self.send_notice(&live.channel, user).await;
        let outcome = match notice {
            Ok(()) => CloseOutcome::NoticeSent,
            Err(e) => {
                tracing::warn!(%user, %channel_id, error = %e, "offline notice not sent");
                CloseOutcome::NoticeUndelivered
            }
        };

        match tokio::time::timeout(self.config.close_timeout, live.channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(%channel_id, error = %e, "channel close failed"),
            Err(_) => tracing::debug!(%channel_id, "channel close timed out"),
        }

        tracing::info!(%user, %channel_id, ?outcome, "presence closed");
        outcome
        // `_guard` drops here: Disconnecting → Disconnected.
    }

    async fn send_notice(&self, channel: &K::Channel, user: &UserId) -> Result<(), NotificationError> {
        let frame = self
            .shared
            .frame(PresenceMessage::GoingOffline {
                user_id: user.clone(),
                reason: "disconnect".into(),
            })
            .map_err(|e| NotificationError::ChannelNotice(e.to_string()))?;

        match tokio::time::timeout(self.config.notice_timeout, channel.send(&frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NotificationError::ChannelNotice(e.to_string())),
            Err(_) => Err(NotificationError::ChannelNotice(format!(
                "timed out after {:?}",
                self.config.notice_timeout
            ))),
        }
    }

    /// Releases the channel without a notice. Used when the process is
    /// terminating and the close handshake may never finish.
    ///
    /// An `open` still in its handshake is superseded and will return
    /// [`ConnectionError::Aborted`].
    pub fn abandon(&self) {
        let live = {
            let mut slot = self.shared.lock();
            slot.epoch += 1;
            let previous = self.shared.state.send_replace(ConnectionState::Disconnected);
            if previous != ConnectionState::Disconnected {
                tracing::debug!(state = %previous, "presence abandoned");
            }
            slot.live.take()
        };
        if let Some(mut live) = live {
            live.stop_monitor();
            tracing::info!(user_id = %live.user, channel_id = %live.channel.id(), "presence channel abandoned");
        }
    }
}

impl<K: Connector> Drop for PresenceConnection<K> {
    fn drop(&mut self) {
        if let Some(mut live) = self.shared.lock().live.take() {
            live.stop_monitor();
        }
    }
}

impl<K: Connector> GracefulChannel for PresenceConnection<K> {
    fn is_open(&self) -> bool {
        self.is_online()
    }

    async fn close_gracefully(&self, user: &UserId) -> Result<(), NotificationError> {
        match self.close(user).await {
            CloseOutcome::NoticeSent | CloseOutcome::AlreadyClosed => Ok(()),
            CloseOutcome::NoticeUndelivered => Err(NotificationError::ChannelNotice(
                "offline frame not delivered before close".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Reads server frames and sends heartbeats until the channel goes away.
async fn monitor<C: Channel>(
    shared: Arc<Shared<C>>,
    channel: Arc<C>,
    epoch: u64,
    heartbeat: Option<Duration>,
) {
    let channel_id = channel.id();
    let mut ticker = heartbeat.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            frame = channel.recv() => match frame {
                Ok(Some(bytes)) => handle_frame(&shared, &bytes),
                Ok(None) => {
                    tracing::debug!(%channel_id, "server closed presence channel");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%channel_id, error = %e, "presence channel read failed");
                    break;
                }
            },
            () = next_tick(&mut ticker) => {
                if let Err(e) = send_heartbeat(&shared, channel.as_ref()).await {
                    tracing::warn!(%channel_id, error = %e, "heartbeat failed");
                    break;
                }
            }
        }
    }

    shared.release(epoch);
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_heartbeat<C: Channel>(shared: &Shared<C>, channel: &C) -> Result<(), TransportError> {
    let frame = shared
        .frame(PresenceMessage::Heartbeat {
            client_time: now_millis(),
        })
        .map_err(|e| TransportError::SendFailed(std::io::Error::other(e)))?;
    tracing::trace!(channel_id = %channel.id(), "heartbeat");
    channel.send(&frame).await
}

fn handle_frame<C>(shared: &Shared<C>, bytes: &[u8]) {
    let envelope: Envelope = match shared.codec.decode(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring undecodable presence frame");
            return;
        }
    };
    match envelope.message {
        PresenceMessage::HeartbeatAck {
            client_time,
            server_time,
        } => {
            tracing::trace!(
                rtt_ms = now_millis().saturating_sub(client_time),
                server_time,
                "heartbeat ack"
            );
        }
        PresenceMessage::Error { code, message } => {
            tracing::warn!(code, reason = %message, "presence server error");
        }
        other => {
            tracing::debug!(frame = ?other, "unexpected presence frame");
        }
    }
}

/// A fresh per-channel nonce: 16 random bytes as lowercase hex.
fn session_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
