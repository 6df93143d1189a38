//! Session state for Vigil.
//!
//! This crate holds everything the presence core knows about "who is signed
//! in" without touching the network:
//!
//! 1. **Token validation**: decoding a bearer token and checking its expiry
//!    ([`validate_token`]).
//! 2. **Stored credentials**: reading the token and user profile the login
//!    flow persisted ([`CredentialStore`]).
//! 3. **State types**: the connection and controller state machines
//!    ([`ConnectionState`], [`ControllerPhase`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Controller (above)  ← reads credentials, validates, drives presence
//!     ↕
//! Session Layer (this crate)  ← token + credential + state types
//!     ↕
//! Protocol Layer (below)  ← provides UserId
//! ```

mod credentials;
mod error;
mod session;
mod token;

pub use credentials::{
    ACCESS_TOKEN_KEY, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    StoredCredentials, USER_KEY, UserProfile,
};
pub use error::SessionError;
pub use session::{ConnectionState, ControllerPhase};
pub use token::{
    Claims, TokenValidation, decode_claims, is_expired, now_millis, validate_token,
    validate_token_at,
};
