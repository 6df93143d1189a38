//! Presence channel timing.

use std::time::Duration;

/// Timeouts and heartbeat settings for a [`PresenceConnection`](crate::PresenceConnection).
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceConfig {
    /// How long `open` waits for the connect plus the `Registered` ack.
    pub handshake_timeout: Duration,

    /// How long `close` waits for the `GoingOffline` frame to be written.
    pub notice_timeout: Duration,

    /// How long `close` waits for the transport's close handshake.
    pub close_timeout: Duration,

    /// Period of client heartbeats. `None` disables them; the monitor then
    /// only watches for the server closing the channel.
    pub heartbeat_interval: Option<Duration>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            notice_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_secs(2),
            heartbeat_interval: Some(Duration::from_secs(15)),
        }
    }
}

impl PresenceConfig {
    /// Floor applied to every timeout.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

    /// Floor applied to the heartbeat period.
    pub const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

    /// Returns a copy with out-of-range values clamped.
    ///
    /// Called by [`PresenceConnection::new`](crate::PresenceConnection::new).
    /// A zero timeout would fail every handshake instantly and a zero period
    /// makes `tokio::time::interval` panic, so both get floors.
    pub fn validated(mut self) -> Self {
        for (name, timeout) in [
            ("handshake_timeout", &mut self.handshake_timeout),
            ("notice_timeout", &mut self.notice_timeout),
            ("close_timeout", &mut self.close_timeout),
        ] {
            if *timeout < Self::MIN_TIMEOUT {
                tracing::warn!(field = name, ?timeout, "timeout below minimum, clamping");
                *timeout = Self::MIN_TIMEOUT;
            }
        }
        if let Some(period) = self.heartbeat_interval.as_mut() {
            if *period < Self::MIN_HEARTBEAT {
                tracing::warn!(?period, "heartbeat_interval below minimum, clamping");
                *period = Self::MIN_HEARTBEAT;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PresenceConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.notice_timeout, Duration::from_secs(2));
        assert_eq!(config.close_timeout, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_validated_clamps_zero_timeouts() {
        let config = PresenceConfig {
            handshake_timeout: Duration::ZERO,
            notice_timeout: Duration::ZERO,
            close_timeout: Duration::from_secs(1),
            heartbeat_interval: Some(Duration::ZERO),
        }
        .validated();

        assert_eq!(config.handshake_timeout, PresenceConfig::MIN_TIMEOUT);
        assert_eq!(config.notice_timeout, PresenceConfig::MIN_TIMEOUT);
        assert_eq!(config.close_timeout, Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval, Some(PresenceConfig::MIN_HEARTBEAT));
    }

    #[test]
    fn test_validated_keeps_disabled_heartbeat() {
        let config = PresenceConfig {
            heartbeat_interval: None,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.heartbeat_interval, None);
    }
}
