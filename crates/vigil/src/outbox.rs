//! Delivery of offline notices left in the spool by a previous process.

use std::time::Duration;

use vigil_session::now_millis;
use vigil_shutdown::{SpoolBeacon, SpooledNotice};

use crate::ApiClient;

/// Most notices kept for the next attempt. The newest win.
pub const MAX_REQUEUED: usize = 32;

/// What a spool flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Notices the server accepted.
    pub delivered: usize,
    /// Notices put back for the next attempt.
    pub requeued: usize,
    /// Notices discarded: expired, aimed outside the API, rejected for good,
    /// or over the requeue cap.
    pub dropped: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.delivered + self.requeued + self.dropped == 0
    }
}

/// POSTs every spooled notice to the URL it was queued for.
///
/// A notice is dropped without a request when it is older than `max_age`
/// or its URL isn't under the client's base URL (the bearer is never sent
/// anywhere else). A notice the server rejects with a non-retryable status
/// is dropped too. Only retryable failures go back to the spool, capped at
/// [`MAX_REQUEUED`]. Errors are logged; a flush never fails the caller.
pub async fn flush_spool(spool: &SpoolBeacon, client: &ApiClient, max_age: Duration) -> FlushReport {
    let notices = match spool.take_pending() {
        Ok(notices) => notices,
        Err(e) => {
            tracing::warn!(path = %spool.path().display(), error = %e, "cannot read notice spool");
            return FlushReport::default();
        }
    };
    if notices.is_empty() {
        return FlushReport::default();
    }

    let now_ms = now_millis();
    let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
    let mut report = FlushReport::default();
    let mut retry: Vec<SpooledNotice> = Vec::new();

    for notice in notices {
        let age_ms = now_ms.saturating_sub(notice.queued_at_ms);
        if age_ms > max_age_ms {
            tracing::info!(url = %notice.url, age_ms, "dropping expired spooled notice");
            report.dropped += 1;
            continue;
        }
        if !client.owns_url(&notice.url) {
            tracing::warn!(url = %notice.url, base = %client.base_url(), "dropping spooled notice for a foreign URL");
            report.dropped += 1;
            continue;
        }

        match client.post_to(&notice.url, &notice.body).await {
            Ok(_) => {
                tracing::info!(url = %notice.url, queued_at_ms = notice.queued_at_ms, "spooled offline notice delivered");
                report.delivered += 1;
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(url = %notice.url, error = %e, "spooled offline notice not delivered, keeping it");
                retry.push(notice);
            }
            Err(e) => {
                tracing::warn!(url = %notice.url, error = %e, "spooled offline notice rejected, dropping it");
                report.dropped += 1;
            }
        }
    }

    if retry.len() > MAX_REQUEUED {
        let excess = retry.len() - MAX_REQUEUED;
        retry.sort_by_key(|notice| notice.queued_at_ms);
        retry.drain(..excess);
        report.dropped += excess;
    }

    report.requeued = retry.len();
    if let Err(e) = spool.requeue(&retry) {
        tracing::warn!(count = retry.len(), error = %e, "lost spooled notices");
    }
    report
}

#[cfg(test)]
mod tests {
    use vigil_shutdown::Beacon;

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    fn notice(url: &str, queued_at_ms: u64) -> SpooledNotice {
        SpooledNotice {
            url: url.to_owned(),
            body: serde_json::json!({ "id": 7 }),
            queued_at_ms,
        }
    }

    #[tokio::test]
    async fn test_flush_spool_empty_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());

        let report = flush_spool(&spool, &client("http://127.0.0.1:9"), DAY).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_flush_spool_delivers_and_empties() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users/disconnect-admin")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "id": 7 })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        let url = format!("{}/users/disconnect-admin", server.url());
        spool.send_beacon(&url, br#"{"id":7}"#).unwrap();

        let report = flush_spool(&spool, &client(&server.url()), DAY).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.requeued, 0);
        assert!(spool.pending().unwrap().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_spool_requeues_retryable_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/users/disconnect-admin")
            .with_status(503)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        let url = format!("{}/users/disconnect-admin", server.url());
        spool.send_beacon(&url, br#"{"id":7}"#).unwrap();

        let report = flush_spool(&spool, &client(&server.url()), DAY).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.requeued, 1);
        let pending = spool.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, url);
    }

    #[tokio::test]
    async fn test_flush_spool_client_error_drops_notice() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/users/disconnect-admin")
            .with_status(400)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        let url = format!("{}/users/disconnect-admin", server.url());
        let api = client(&server.url());

        // Several terminate-then-start cycles against a server that keeps
        // refusing the notice must not grow the spool.
        for _ in 0..3 {
            spool.send_beacon(&url, br#"{"id":7}"#).unwrap();
            let report = flush_spool(&spool, &api, DAY).await;
            assert_eq!(report.dropped, 1);
            assert_eq!(report.requeued, 0);
        }
        assert!(spool.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_spool_rate_limited_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/users/disconnect-admin")
            .with_status(429)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        let url = format!("{}/users/disconnect-admin", server.url());
        spool.send_beacon(&url, br#"{"id":7}"#).unwrap();

        let report = flush_spool(&spool, &client(&server.url()), DAY).await;

        assert_eq!(report.requeued, 1);
        assert_eq!(spool.pending().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_spool_expired_notice_is_dropped_unsent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users/disconnect-admin")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        let url = format!("{}/users/disconnect-admin", server.url());
        let two_days_ago = now_millis() - 2 * 24 * 60 * 60 * 1000;
        spool.requeue(&[notice(&url, two_days_ago)]).unwrap();

        let report = flush_spool(&spool, &client(&server.url()), DAY).await;

        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 0);
        assert!(spool.pending().unwrap().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_spool_foreign_url_is_dropped_unsent() {
        let mut elsewhere = mockito::Server::new_async().await;
        let foreign = elsewhere
            .mock("POST", "/collect")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        let url = format!("{}/collect", elsewhere.url());
        spool.send_beacon(&url, br#"{"id":7}"#).unwrap();
        let api = client("http://127.0.0.1:9/api").with_bearer("secret");

        let report = flush_spool(&spool, &api, DAY).await;

        assert_eq!(report.dropped, 1);
        assert!(spool.pending().unwrap().is_empty());
        foreign.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_spool_caps_requeued_notices() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolBeacon::new(dir.path());
        // Port 9 refuses connections: every notice fails as retryable.
        let base = "http://127.0.0.1:9";
        let url = format!("{base}/users/disconnect-admin");
        let now = now_millis();
        let backlog: Vec<_> = (0..MAX_REQUEUED as u64 + 5)
            .map(|i| notice(&url, now - 1000 + i))
            .collect();
        spool.requeue(&backlog).unwrap();

        let report = flush_spool(&spool, &client(base), DAY).await;

        assert_eq!(report.requeued, MAX_REQUEUED);
        assert_eq!(report.dropped, 5);
        let pending = spool.pending().unwrap();
        assert_eq!(pending.len(), MAX_REQUEUED);
        // The oldest were the ones dropped.
        assert_eq!(pending[0].queued_at_ms, now - 1000 + 5);
    }
}
