//! The session controller: ties credentials, presence, and shutdown together.
//!
//! ```text
//! Idle ──start()──→ Validating ──valid token + open──→ Active
//!  ↑                    │                                 │
//!  │        (no creds / bad token / open failed)   teardown() / terminate()
//!  │                    ↓                                 ↓
//!  └────────────────── Idle ←────────────────────── Terminating
//! ```
//!
//! Teardown and termination are two independent triggers that can both fire
//! for the same session (a UI unmount racing a SIGTERM). They share one
//! [`shutdown`](SessionController::shutdown) primitive that only acts on an
//! `Active` session, and the notifier's one-shot latch guarantees a single
//! offline notice.

use std::future::Future;
use std::sync::Arc;

use vigil_presence::{PresenceConnection, PresenceStatus};
use vigil_protocol::UserId;
use vigil_session::{
    Claims, ConnectionState, ControllerPhase, CredentialStore, UserProfile, is_expired,
    now_millis, validate_token,
};
use vigil_shutdown::{
    HttpBlockingTransport, NotifyOutcome, ShutdownContext, ShutdownNotifier, ShutdownTrigger,
    SpoolBeacon,
};
use vigil_transport::Connector;

use crate::outbox::flush_spool;
use crate::{ApiClient, ApiLivenessProbe, ControllerConfig, LivenessProbe, VigilError};

/// The live session: who is signed in and with which token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserProfile,
    pub token: String,
    pub claims: Option<Claims>,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// What `start` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The session is active and presence is online.
    Online,
    /// Nothing stored: nobody is signed in.
    SignedOut,
    /// The stored token is malformed or expired. The liveness probe ran.
    TokenRejected,
    /// `start` was called while a session was already running.
    AlreadyStarted,
}

/// Owns the session and drives the presence lifecycle.
///
/// Operations take `&mut self`, so a single owner serializes them; the UI
/// observes presence through [`status`](Self::status).
pub struct SessionController<S, K, P = ApiLivenessProbe>
where
    S: CredentialStore,
    K: Connector,
    P: LivenessProbe,
{
    config: ControllerConfig,
    store: S,
    presence: PresenceConnection<K>,
    notifier: ShutdownNotifier,
    spool: Option<Arc<SpoolBeacon>>,
    api: ApiClient,
    probe: P,
    phase: ControllerPhase,
    session: Option<Session>,
}

impl<S, K> SessionController<S, K, ApiLivenessProbe>
where
    S: CredentialStore,
    K: Connector,
{
    /// Builds a controller with the standard tiers: channel close, the spool
    /// beacon (when `spool_dir` is set), and the blocking HTTP request.
    ///
    /// # Errors
    /// Returns [`VigilError::Http`] if the HTTP client can't be built.
    pub fn new(store: S, connector: K, config: ControllerConfig) -> Result<Self, VigilError> {
        let config = config.validated();
        let api = ApiClient::new(&config.api_base_url, config.request_timeout)?;
        let probe = ApiLivenessProbe::new(api.clone(), &config.liveness_path);

        let spool = config
            .spool_dir
            .clone()
            .map(|dir| Arc::new(SpoolBeacon::new(dir)));
        let mut notifier = ShutdownNotifier::builder(config.disconnect_url());
        if let Some(spool) = &spool {
            notifier = notifier.beacon(spool.clone());
        }
        let notifier = notifier
            .blocking(Arc::new(HttpBlockingTransport::new(config.blocking_timeout)))
            .build();

        tracing::debug!(tiers = ?notifier.tier_kinds(), "session controller created");

        Ok(Self {
            presence: PresenceConnection::new(connector, config.presence.clone()),
            config,
            store,
            notifier,
            spool,
            api,
            probe,
            phase: ControllerPhase::Idle,
            session: None,
        })
    }
}

impl<S, K, P> SessionController<S, K, P>
where
    S: CredentialStore,
    K: Connector,
    P: LivenessProbe,
{
    /// Replaces the liveness probe.
    pub fn with_probe<Q: LivenessProbe>(self, probe: Q) -> SessionController<S, K, Q> {
        SessionController {
            config: self.config,
            store: self.store,
            presence: self.presence,
            notifier: self.notifier,
            spool: self.spool,
            api: self.api,
            probe,
            phase: self.phase,
            session: self.session,
        }
    }

    /// Replaces the shutdown notifier (and with it the tier list).
    pub fn with_notifier(mut self, notifier: ShutdownNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.presence.state()
    }

    /// A status observer for the UI.
    pub fn status(&self) -> PresenceStatus {
        self.presence.status()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn notifier(&self) -> &ShutdownNotifier {
        &self.notifier
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Reads the stored credentials and, if the token is valid, goes online.
    ///
    /// Spooled notices from a previous process are delivered first, so the
    /// server never sees a stale offline notice arrive after a fresh
    /// registration.
    ///
    /// # Errors
    /// Returns [`VigilError::Connection`] if the presence channel can't be
    /// opened. The controller is back in `Idle` in that case.
    pub async fn start(&mut self) -> Result<StartOutcome, VigilError> {
        if self.phase != ControllerPhase::Idle {
            tracing::debug!(phase = %self.phase, "start ignored, session already running");
            return Ok(StartOutcome::AlreadyStarted);
        }

        let stored_token = self.store.stored_token();
        if let Some(spool) = &self.spool {
            let client = match &stored_token {
                Some(token) => self.api.with_bearer(token),
                None => self.api.clone(),
            };
            let report = flush_spool(spool, &client, self.config.spool_ttl).await;
            if !report.is_empty() {
                tracing::info!(
                    delivered = report.delivered,
                    requeued = report.requeued,
                    dropped = report.dropped,
                    "notice spool flushed"
                );
            }
        }

        let Some(creds) = self.store.load() else {
            tracing::debug!("no stored credentials, staying idle");
            return Ok(StartOutcome::SignedOut);
        };

        self.phase = ControllerPhase::Validating;
        let validation = validate_token(&creds.token);
        if !validation.valid {
            tracing::info!(user_id = %creds.user.id, "stored token invalid or expired, not connecting");
            if let Err(e) = self.probe.probe(Some(&creds.token)).await {
                tracing::debug!(error = %e, "liveness probe failed");
            }
            self.phase = ControllerPhase::Idle;
            return Ok(StartOutcome::TokenRejected);
        }

        let user_id = creds.user.id.clone();
        if let Err(e) = self.presence.open(user_id.clone()).await {
            self.phase = ControllerPhase::Idle;
            return Err(e.into());
        }

        self.session = Some(Session {
            user: creds.user,
            token: creds.token,
            claims: validation.claims,
        });
        self.notifier.arm();
        self.phase = ControllerPhase::Active;
        tracing::info!(%user_id, "session active");
        Ok(StartOutcome::Online)
    }

    /// Normal teardown: the owner is going away, the runtime is not.
    pub async fn teardown(&mut self) -> NotifyOutcome {
        self.shutdown(ShutdownTrigger::Teardown).await
    }

    /// The process received a termination signal.
    pub async fn terminate(&mut self) -> NotifyOutcome {
        self.shutdown(ShutdownTrigger::Terminate).await
    }

    /// Explicit logout. Same effect as a teardown; clearing the stored
    /// credentials is the login flow's job.
    pub async fn logout(&mut self) -> NotifyOutcome {
        self.shutdown(ShutdownTrigger::Teardown).await
    }

    /// The shared shutdown primitive behind every trigger.
    ///
    /// Only an `Active` session is shut down; anything else is `Skipped`.
    /// The notifier picks the delivery tier, then the connection is
    /// released: closed after a teardown, abandoned after a termination.
    pub async fn shutdown(&mut self, trigger: ShutdownTrigger) -> NotifyOutcome {
        if self.phase != ControllerPhase::Active {
            tracing::debug!(%trigger, phase = %self.phase, "shutdown ignored, no active session");
            return NotifyOutcome::Skipped;
        }
        self.phase = ControllerPhase::Terminating;
        let session = self.session.take();

        let ctx = ShutdownContext {
            trigger,
            user: session.as_ref().map(Session::user_id),
            bearer: session.as_ref().map(|s| s.token.as_str()),
        };
        let outcome = self.notifier.notify(&ctx, &self.presence).await;

        match trigger {
            ShutdownTrigger::Teardown => {
                if let Some(session) = &session {
                    self.presence.close(session.user_id()).await;
                }
            }
            ShutdownTrigger::Terminate => self.presence.abandon(),
        }

        self.phase = ControllerPhase::Idle;
        tracing::info!(%trigger, ?outcome, "session ended");
        outcome
    }

    /// Re-checks the held token. An expired token ends the session with a
    /// teardown; the outcome of that teardown is returned.
    pub async fn revalidate(&mut self) -> Option<NotifyOutcome> {
        if self.phase != ControllerPhase::Active {
            return None;
        }
        let expired = match &self.session {
            Some(session) => session
                .claims
                .as_ref()
                .is_none_or(|claims| is_expired(claims, now_millis())),
            None => true,
        };
        if !expired {
            tracing::trace!("token still valid");
            return None;
        }
        tracing::info!("session token expired, ending session");
        Some(self.teardown().await)
    }

    /// Starts, then serves until `shutdown` resolves.
    ///
    /// Every `revalidate_interval` the held token is re-checked. When
    /// `shutdown` resolves the session is terminated and that outcome
    /// returned.
    ///
    /// # Errors
    /// Whatever [`start`](Self::start) returns.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<NotifyOutcome, VigilError>
    where
        F: Future<Output = ()>,
    {
        let started = self.start().await?;
        tracing::debug!(?started, "controller running");

        tokio::pin!(shutdown);
        let period = self.config.revalidate_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    return Ok(self.terminate().await);
                }
                _ = ticker.tick() => {
                    if let Some(outcome) = self.revalidate().await {
                        tracing::debug!(?outcome, "revalidation ended the session");
                    }
                }
            }
        }
    }
}
