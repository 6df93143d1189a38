//! Thin HTTP client for the application API.
//!
//! Requests carry a bearer token when one is set. Response bodies are
//! returned as JSON; an empty body comes back as `Value::Null` and a
//! non-JSON body as `Value::String`.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;

/// A request to the API failed.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request never got a response (DNS, connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl HttpError {
    /// Whether the same request might succeed later.
    ///
    /// Transport failures, 5xx, 408, and 429 are retryable. Any other
    /// status is the server's final answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
        }
    }
}

/// HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl ApiClient {
    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns [`HttpError::Request`] if the TLS backend can't initialize.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            bearer: None,
        })
    }

    /// A copy of this client that sends `token` as the bearer.
    pub fn with_bearer(&self, token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `true` if `url` is the base URL or lies beneath it.
    pub fn owns_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<Value, HttpError> {
        self.send(self.http.get(self.url(path))).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, HttpError> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, HttpError> {
        self.send(self.http.put(self.url(path)).json(body)).await
    }

    /// POSTs to an absolute URL, ignoring the base.
    pub async fn post_to<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value, HttpError> {
        self.send(self.http.post(url).json(body)).await
    }

    /// GETs `path` and discards the body. Only the status matters.
    pub async fn ping(&self, path: &str) -> Result<StatusCode, HttpError> {
        let response = self.authorize(self.http.get(self.url(path))).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(HttpError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, HttpError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

/// Joins a base URL and a path with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_owns_url_accepts_paths_under_base_only() {
        let api = client("https://api.example/v1/");
        assert!(api.owns_url("https://api.example/v1"));
        assert!(api.owns_url("https://api.example/v1/users/disconnect-admin"));
        assert!(!api.owns_url("https://api.example/v2/users/disconnect-admin"));
        assert!(!api.owns_url("https://api.example/v1evil/x"));
        assert!(!api.owns_url("https://api.example.evil.test/v1/x"));
        assert!(!api.owns_url("http://api.example/v1/x"));
    }

    #[test]
    fn test_is_retryable_classifies_statuses() {
        let status = |status| HttpError::Status {
            status,
            body: String::new(),
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(408).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_url_joins_with_single_slash() {
        assert_eq!(client("http://api/").url("/auth/ping"), "http://api/auth/ping");
        assert_eq!(client("http://api").url("auth/ping"), "http://api/auth/ping");
    }

    #[tokio::test]
    async fn test_get_sends_bearer_and_parses_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":7}"#)
            .create_async()
            .await;

        let value = client(&server.url()).with_bearer("tok").get("/me").await.unwrap();

        assert_eq!(value, serde_json::json!({ "id": 7 }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_empty_body_is_null() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/users/disconnect-admin")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "id": 7 })))
            .with_status(204)
            .create_async()
            .await;

        let value = client(&server.url())
            .post("/users/disconnect-admin", &serde_json::json!({ "id": 7 }))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_put_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/profile")
            .with_status(422)
            .with_body("bad field")
            .create_async()
            .await;

        let err = client(&server.url())
            .put("/profile", &serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            HttpError::Status { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "bad field");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ping_unauthorized_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/auth/ping")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server.url()).ping("/auth/ping").await.unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 401, .. }));
    }
}
