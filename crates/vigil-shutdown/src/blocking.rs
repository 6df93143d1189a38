//! The last-resort tier: a synchronous HTTP POST.

use std::time::Duration;

use crate::NotificationError;

/// A request that has finished, one way or the other, by the time the call
/// returns.
pub trait BlockingTransport: Send + Sync {
    /// POSTs `body` as JSON to `url`, with `bearer` as the Authorization
    /// token when present.
    fn post_blocking(
        &self,
        url: &str,
        body: &[u8],
        bearer: Option<&str>,
    ) -> Result<(), NotificationError>;
}

/// [`BlockingTransport`] built on `reqwest::blocking`.
///
/// `reqwest::blocking` owns a runtime of its own and panics when driven
/// from inside an async context, so each request runs on a short-lived
/// named thread that the caller joins. The caller's thread is blocked for
/// at most `timeout`.
#[derive(Debug, Clone)]
pub struct HttpBlockingTransport {
    timeout: Duration,
}

impl HttpBlockingTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl BlockingTransport for HttpBlockingTransport {
    fn post_blocking(
        &self,
        url: &str,
        body: &[u8],
        bearer: Option<&str>,
    ) -> Result<(), NotificationError> {
        let url = url.to_owned();
        let body = body.to_vec();
        let bearer = bearer.map(str::to_owned);
        let timeout = self.timeout;

        let handle = std::thread::Builder::new()
            .name("vigil-offline-notice".into())
            .spawn(move || -> Result<(), NotificationError> {
                let client = reqwest::blocking::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(NotificationError::Http)?;

                let mut request = client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body);
                if let Some(token) = bearer {
                    request = request.bearer_auth(token);
                }

                let response = request.send().map_err(NotificationError::Http)?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(NotificationError::Status(status.as_u16()))
                }
            })
            .map_err(NotificationError::Thread)?;

        handle
            .join()
            .map_err(|_| NotificationError::ThreadPanicked)?
    }
}
