//! Controller configuration.

use std::path::PathBuf;
use std::time::Duration;

use vigil_presence::PresenceConfig;

use crate::http::join_url;

/// Endpoints, timeouts, and storage locations for a
/// [`SessionController`](crate::SessionController).
///
/// Start from [`ControllerConfig::new`] (or `Default`) and override with the
/// builder-style setters:
///
/// ```rust
/// use std::time::Duration;
/// use vigil::ControllerConfig;
///
/// let config = ControllerConfig::new("wss://example.com/presence", "https://example.com/api")
///     .spool_dir("/var/lib/vigil")
///     .revalidate_interval(Duration::from_secs(30));
///
/// assert_eq!(config.disconnect_url(), "https://example.com/api/users/disconnect-admin");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// WebSocket URL of the presence server.
    pub presence_url: String,

    /// Base URL of the application API.
    pub api_base_url: String,

    /// Path of the out-of-band offline endpoint, relative to the API base.
    pub disconnect_path: String,

    /// Path the liveness probe GETs when the stored token has expired.
    pub liveness_path: String,

    /// Timeout for async API requests.
    pub request_timeout: Duration,

    /// Upper bound on the blocking fallback request.
    pub blocking_timeout: Duration,

    /// How often `run` re-checks the held token.
    pub revalidate_interval: Duration,

    /// Directory for the durable notice spool. `None` disables the beacon
    /// tier; termination then goes straight to the blocking request.
    pub spool_dir: Option<PathBuf>,

    /// Spooled notices older than this are discarded instead of sent.
    pub spool_ttl: Duration,

    /// Presence channel settings.
    pub presence: PresenceConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            presence_url: "ws://127.0.0.1:8080/presence".into(),
            api_base_url: "http://127.0.0.1:8080".into(),
            disconnect_path: "/users/disconnect-admin".into(),
            liveness_path: "/auth/ping".into(),
            request_timeout: Duration::from_secs(10),
            blocking_timeout: Duration::from_secs(3),
            revalidate_interval: Duration::from_secs(60),
            spool_dir: None,
            spool_ttl: Duration::from_secs(24 * 60 * 60),
            presence: PresenceConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Floor for `revalidate_interval`.
    pub const MIN_REVALIDATE_INTERVAL: Duration = Duration::from_secs(1);

    /// Floor for both request timeouts.
    pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

    /// Defaults with the two endpoints filled in.
    pub fn new(presence_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            presence_url: presence_url.into(),
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    pub fn disconnect_path(mut self, path: impl Into<String>) -> Self {
        self.disconnect_path = path.into();
        self
    }

    pub fn liveness_path(mut self, path: impl Into<String>) -> Self {
        self.liveness_path = path.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    pub fn revalidate_interval(mut self, interval: Duration) -> Self {
        self.revalidate_interval = interval;
        self
    }

    pub fn spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn spool_ttl(mut self, ttl: Duration) -> Self {
        self.spool_ttl = ttl;
        self
    }

    pub fn presence(mut self, presence: PresenceConfig) -> Self {
        self.presence = presence;
        self
    }

    /// Full URL of the offline endpoint.
    pub fn disconnect_url(&self) -> String {
        join_url(&self.api_base_url, &self.disconnect_path)
    }

    /// Returns a copy with out-of-range values clamped.
    ///
    /// A zero revalidation period would make `tokio::time::interval` panic.
    pub fn validated(mut self) -> Self {
        if self.revalidate_interval < Self::MIN_REVALIDATE_INTERVAL {
            tracing::warn!(interval = ?self.revalidate_interval, "revalidate_interval below minimum, clamping");
            self.revalidate_interval = Self::MIN_REVALIDATE_INTERVAL;
        }
        self.request_timeout = self.request_timeout.max(Self::MIN_REQUEST_TIMEOUT);
        self.blocking_timeout = self.blocking_timeout.max(Self::MIN_REQUEST_TIMEOUT);
        self.presence = self.presence.validated();
        self
    }
}
