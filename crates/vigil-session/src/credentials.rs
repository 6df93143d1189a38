//! Stored credentials: the token and user profile the login flow persisted.
//!
//! Vigil doesn't log anyone in; that's the job of whatever UI or CLI owns
//! the login form. That code writes two entries into client-local storage:
//!
//! - `access_token`: the raw bearer token
//! - `user`: the user profile as JSON (`{ "id": ..., ...profile }`)
//!
//! The presence core only ever READS them, through [`CredentialStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use vigil_protocol::UserId;

use crate::SessionError;

/// Storage key of the bearer token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key of the user profile.
pub const USER_KEY: &str = "user";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The signed-in user's profile. Only `id` matters to presence; the rest is
/// carried along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// A profile with just an id.
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            profile: serde_json::Map::new(),
        }
    }
}

/// Both stored entries, present together.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredentials {
    pub token: String,
    pub user: UserProfile,
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Read-only view of the Auth Store.
///
/// Implementations log and swallow their own read errors: an unreadable
/// store simply means "nobody is signed in".
pub trait CredentialStore: Send + Sync {
    /// The stored bearer token, if any. Empty strings count as absent.
    fn stored_token(&self) -> Option<String>;

    /// The stored user profile, if any and if it parses.
    fn stored_user(&self) -> Option<UserProfile>;

    /// Both entries, or `None` if either is missing.
    fn load(&self) -> Option<StoredCredentials> {
        Some(StoredCredentials {
            token: self.stored_token()?,
            user: self.stored_user()?,
        })
    }
}

/// Parses a `user` entry stored as a JSON string.
fn parse_user(raw: &str) -> Result<UserProfile, SessionError> {
    serde_json::from_str(raw).map_err(|e| SessionError::MalformedEntry {
        key: USER_KEY,
        reason: e.to_string(),
    })
}

fn non_empty(token: String) -> Option<String> {
    (!token.trim().is_empty()).then_some(token)
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// An in-memory, string-keyed store with browser-storage semantics: every
/// value is a string, and the `user` entry is a JSON-encoded string.
///
/// Writes are for the login/logout code (and tests); the presence core
/// only reads.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// An empty store: nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated the way the login flow leaves it.
    pub fn with_credentials(token: &str, user: &UserProfile) -> Self {
        let store = Self::new();
        store.set(ACCESS_TOKEN_KEY, token);
        // Serializing a map of JSON values can't fail.
        if let Ok(raw) = serde_json::to_string(user) {
            store.set(USER_KEY, &raw);
        }
        store
    }

    /// Writes an entry.
    pub fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
    }

    /// Removes an entry (logout).
    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn stored_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY).and_then(non_empty)
    }

    fn stored_user(&self) -> Option<UserProfile> {
        let raw = self.get(USER_KEY)?;
        parse_user(&raw)
            .inspect_err(|e| tracing::warn!(error = %e, "ignoring stored user"))
            .ok()
    }
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// A store backed by a JSON object file:
///
/// ```json
/// { "access_token": "eyJ...", "user": "{\"id\":7,\"name\":\"Ada\"}" }
/// ```
///
/// The `user` value may also be a plain JSON object. The file is re-read on
/// every call because the login flow may rewrite it at any time.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file. A missing file is "signed out", not an error.
    fn read_entries(
        &self,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Store(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SessionError::MalformedEntry {
                key: "<root>",
                reason: e.to_string(),
            })
    }

    fn entry(&self, key: &'static str) -> Option<serde_json::Value> {
        match self.read_entries() {
            Ok(entries) => entries?.remove(key),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "credential file unreadable");
                None
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn stored_token(&self) -> Option<String> {
        match self.entry(ACCESS_TOKEN_KEY)? {
            serde_json::Value::String(token) => non_empty(token),
            other => {
                tracing::warn!(kind = ?other, "stored access token is not a string");
                None
            }
        }
    }

    fn stored_user(&self) -> Option<UserProfile> {
        let parsed = match self.entry(USER_KEY)? {
            serde_json::Value::String(raw) => parse_user(&raw),
            value => serde_json::from_value(value).map_err(|e| SessionError::MalformedEntry {
                key: USER_KEY,
                reason: e.to_string(),
            }),
        };
        parsed
            .inspect_err(|e| tracing::warn!(error = %e, "ignoring stored user"))
            .ok()
    }
}

// =========================================================================
// Tests
// =========================================================================
