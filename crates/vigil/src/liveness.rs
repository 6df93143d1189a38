//! The liveness probe run when the stored token is no longer valid.
//!
//! The controller doesn't refresh tokens. When it finds an expired token it
//! pings the API once with it; an external refresh mechanism (an auth
//! gateway, a cookie-based session) may use that request to rotate the
//! credentials. The result is only logged.

use std::future::Future;

use crate::{ApiClient, HttpError};

/// A lightweight request confirming the session server-side.
pub trait LivenessProbe: Send + Sync {
    /// Probes the API, authenticating with `token` if given.
    fn probe(&self, token: Option<&str>) -> impl Future<Output = Result<(), HttpError>> + Send;
}

/// [`LivenessProbe`] that issues `GET <path>` against the API.
#[derive(Debug, Clone)]
pub struct ApiLivenessProbe {
    client: ApiClient,
    path: String,
}

impl ApiLivenessProbe {
    pub fn new(client: ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl LivenessProbe for ApiLivenessProbe {
    async fn probe(&self, token: Option<&str>) -> Result<(), HttpError> {
        let status = match token {
            Some(token) => self.client.with_bearer(token).ping(&self.path).await?,
            None => self.client.ping(&self.path).await?,
        };
        tracing::debug!(path = %self.path, %status, "liveness probe answered");
        Ok(())
    }
}
