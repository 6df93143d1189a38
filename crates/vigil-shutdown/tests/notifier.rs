//! Tier fallback behavior of the shutdown notifier.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use vigil_protocol::UserId;
use vigil_shutdown::*;

// =========================================================================
// Test doubles
// =========================================================================

/// A channel whose openness and close result the test controls.
struct FakeChannel {
    open: AtomicBool,
    fail_close: bool,
    closes: AtomicUsize,
}

impl FakeChannel {
    fn open() -> Self {
        Self {
            open: AtomicBool::new(true),
            fail_close: false,
            closes: AtomicUsize::new(0),
        }
    }

    fn closed() -> Self {
        let channel = Self::open();
        channel.open.store(false, Ordering::SeqCst);
        channel
    }

    fn failing() -> Self {
        Self {
            fail_close: true,
            ..Self::open()
        }
    }
}

impl GracefulChannel for FakeChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close_gracefully(&self, _user: &UserId) -> Result<(), NotificationError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(NotificationError::ChannelNotice("socket reset".into()));
        }
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every beacon; can be made unavailable or failing.
#[derive(Default)]
struct RecordingBeacon {
    unavailable: bool,
    fail: bool,
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Beacon for RecordingBeacon {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn send_beacon(&self, url: &str, body: &[u8]) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Spool(std::io::Error::other("disk full")));
        }
        self.sent.lock().unwrap().push((url.to_owned(), body.to_vec()));
        Ok(())
    }
}

/// Records every blocking request.
#[derive(Default)]
struct RecordingBlocking {
    fail: bool,
    sent: Mutex<Vec<(String, Vec<u8>, Option<String>)>>,
}

impl BlockingTransport for RecordingBlocking {
    fn post_blocking(
        &self,
        url: &str,
        body: &[u8],
        bearer: Option<&str>,
    ) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Status(503));
        }
        self.sent
            .lock()
            .unwrap()
            .push((url.to_owned(), body.to_vec(), bearer.map(str::to_owned)));
        Ok(())
    }
}

const URL: &str = "http://api.test/users/disconnect-admin";

fn ctx<'a>(trigger: ShutdownTrigger, user: &'a UserId) -> ShutdownContext<'a> {
    ShutdownContext {
        trigger,
        user: Some(user),
        bearer: Some("tok"),
    }
}

fn armed(beacon: Arc<RecordingBeacon>, blocking: Arc<RecordingBlocking>) -> ShutdownNotifier {
    let notifier = ShutdownNotifier::builder(URL)
        .beacon(beacon)
        .blocking(blocking)
        .build();
    notifier.arm();
    notifier
}

// =========================================================================
// Tier selection
// =========================================================================

#[tokio::test]
async fn test_notify_teardown_open_channel_uses_channel_close() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking.clone());
    let channel = FakeChannel::open();
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Teardown, &user), &channel)
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::ChannelClose));
    assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
    assert!(beacon.sent.lock().unwrap().is_empty());
    assert!(blocking.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_notify_terminate_skips_channel_and_uses_beacon() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking.clone());
    let channel = FakeChannel::open();
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &channel)
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::Beacon));
    assert_eq!(channel.closes.load(Ordering::SeqCst), 0);

    let sent = beacon.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, URL);
    let body: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
    assert_eq!(body, serde_json::json!({ "id": 7 }));
}

#[tokio::test]
async fn test_notify_teardown_closed_channel_counts_as_delivered() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking.clone());
    let channel = FakeChannel::closed();
    let user = UserId::from("u-1");

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Teardown, &user), &channel)
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::ChannelClose));
    assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
    assert!(beacon.sent.lock().unwrap().is_empty());
    assert!(blocking.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_notify_teardown_channel_failure_never_uses_fallbacks() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking.clone());
    let channel = FakeChannel::failing();
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Teardown, &user), &channel)
        .await;

    assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
    assert_eq!(outcome, NotifyOutcome::Exhausted);
    assert!(beacon.sent.lock().unwrap().is_empty());
    assert!(blocking.sent.lock().unwrap().is_empty());
}

#[test]
fn test_precondition_fallback_tiers_require_terminate() {
    let beacon = DeliveryTier::Beacon(Arc::new(RecordingBeacon::default()));
    let blocking = DeliveryTier::Blocking(Arc::new(RecordingBlocking::default()));

    assert!(DeliveryTier::ChannelClose.precondition(ShutdownTrigger::Teardown));
    assert!(!DeliveryTier::ChannelClose.precondition(ShutdownTrigger::Terminate));
    assert!(!beacon.precondition(ShutdownTrigger::Teardown));
    assert!(beacon.precondition(ShutdownTrigger::Terminate));
    assert!(!blocking.precondition(ShutdownTrigger::Teardown));
    assert!(blocking.precondition(ShutdownTrigger::Terminate));
}

#[test]
fn test_precondition_unavailable_beacon_is_skipped() {
    let beacon = DeliveryTier::Beacon(Arc::new(RecordingBeacon {
        unavailable: true,
        ..Default::default()
    }));
    assert!(!beacon.precondition(ShutdownTrigger::Terminate));
}

#[tokio::test]
async fn test_notify_beacon_unavailable_uses_blocking_with_bearer() {
    let beacon = Arc::new(RecordingBeacon {
        unavailable: true,
        ..Default::default()
    });
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon, blocking.clone());
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::Blocking));
    let sent = blocking.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, URL);
    assert_eq!(sent[0].2.as_deref(), Some("tok"));
}

#[tokio::test]
async fn test_notify_beacon_failure_uses_blocking() {
    let beacon = Arc::new(RecordingBeacon {
        fail: true,
        ..Default::default()
    });
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon, blocking.clone());
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::Blocking));
    assert_eq!(blocking.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_notify_all_tiers_fail_is_exhausted() {
    let beacon = Arc::new(RecordingBeacon {
        fail: true,
        ..Default::default()
    });
    let blocking = Arc::new(RecordingBlocking {
        fail: true,
        ..Default::default()
    });
    let notifier = armed(beacon, blocking);
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Exhausted);
}

#[tokio::test]
async fn test_notify_terminate_without_fallbacks_is_exhausted() {
    let notifier = ShutdownNotifier::builder(URL).build();
    notifier.arm();
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Exhausted);
}

// =========================================================================
// Skips and the one-shot latch
// =========================================================================

#[tokio::test]
async fn test_notify_without_user_is_skipped() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking.clone());

    let ctx = ShutdownContext {
        trigger: ShutdownTrigger::Terminate,
        user: None,
        bearer: None,
    };
    let outcome = notifier.notify(&ctx, &FakeChannel::open()).await;

    assert_eq!(outcome, NotifyOutcome::Skipped);
    assert!(beacon.sent.lock().unwrap().is_empty());
    assert!(blocking.sent.lock().unwrap().is_empty());
    // A skipped call doesn't consume the latch.
    assert!(notifier.is_armed());
}

#[tokio::test]
async fn test_notify_twice_delivers_once() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking.clone());
    let channel = FakeChannel::open();
    let user = UserId::from(7);

    let first = notifier
        .notify(&ctx(ShutdownTrigger::Teardown, &user), &channel)
        .await;
    let second = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &channel)
        .await;

    assert_eq!(first, NotifyOutcome::Delivered(TierKind::ChannelClose));
    assert_eq!(second, NotifyOutcome::Skipped);
    assert_eq!(channel.closes.load(Ordering::SeqCst), 1);
    assert!(beacon.sent.lock().unwrap().is_empty());
    assert!(blocking.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_notify_unarmed_is_skipped() {
    let beacon = Arc::new(RecordingBeacon::default());
    let notifier = ShutdownNotifier::builder(URL).beacon(beacon.clone()).build();
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Skipped);
    assert!(beacon.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rearm_allows_next_session_to_notify() {
    let beacon = Arc::new(RecordingBeacon::default());
    let blocking = Arc::new(RecordingBlocking::default());
    let notifier = armed(beacon.clone(), blocking);
    let user = UserId::from(7);
    let channel = FakeChannel::closed();

    notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &channel)
        .await;
    notifier.arm();
    notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &channel)
        .await;

    assert_eq!(beacon.sent.lock().unwrap().len(), 2);
}

// =========================================================================
// Real fallbacks
// =========================================================================

#[tokio::test]
async fn test_spool_beacon_as_tier_persists_notice() {
    let dir = tempfile::tempdir().unwrap();
    let spool = Arc::new(SpoolBeacon::new(dir.path()));
    let notifier = ShutdownNotifier::builder(URL).beacon(spool.clone()).build();
    notifier.arm();
    let user = UserId::from(42);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::Beacon));
    let pending = spool.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, URL);
    assert_eq!(pending[0].body, serde_json::json!({ "id": 42 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_blocking_transport_posts_with_bearer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/users/disconnect-admin")
        .match_header("authorization", "Bearer tok")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::Json(serde_json::json!({ "id": 7 })))
        .with_status(200)
        .create_async()
        .await;

    let url = format!("{}/users/disconnect-admin", server.url());
    let notifier = ShutdownNotifier::builder(url)
        .blocking(Arc::new(HttpBlockingTransport::new(Duration::from_secs(3))))
        .build();
    notifier.arm();
    let user = UserId::from(7);

    let outcome = notifier
        .notify(&ctx(ShutdownTrigger::Terminate, &user), &FakeChannel::open())
        .await;

    assert_eq!(outcome, NotifyOutcome::Delivered(TierKind::Blocking));
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_blocking_transport_error_status_is_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/users/disconnect-admin")
        .with_status(500)
        .create_async()
        .await;

    let transport = HttpBlockingTransport::new(Duration::from_secs(3));
    let url = format!("{}/users/disconnect-admin", server.url());
    let result = transport.post_blocking(&url, br#"{"id":7}"#, None);

    assert!(matches!(result, Err(NotificationError::Status(500))));
}

#[test]
fn test_http_blocking_transport_unreachable_is_failure() {
    // Port 9 (discard) on loopback is closed on test machines.
    let transport = HttpBlockingTransport::new(Duration::from_millis(500));
    let result = transport.post_blocking("http://127.0.0.1:9/x", br#"{"id":7}"#, None);
    assert!(matches!(result, Err(NotificationError::Http(_))));
}
