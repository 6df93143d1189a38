//! Error types for the session layer.

/// Errors that can occur while reading credentials or decoding tokens.
///
/// None of these ever reach the user: the controller treats every one of
/// them as "not signed in" after logging it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token is not a structurally valid JWT (wrong segment count, bad
    /// base64, claims that aren't JSON, unknown algorithm).
    #[error("token decode failed: {0}")]
    TokenDecode(String),

    /// The credential store could not be read.
    #[error("credential store unreadable: {0}")]
    Store(#[source] std::io::Error),

    /// A stored entry exists but doesn't parse.
    #[error("stored entry `{key}` is malformed: {reason}")]
    MalformedEntry { key: &'static str, reason: String },
}
