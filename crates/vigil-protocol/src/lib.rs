//! Presence wire protocol for Vigil.
//!
//! This crate defines the "language" a client and the presence server speak
//! over the persistent channel:
//!
//! - **Types** ([`Envelope`], [`PresenceMessage`], [`UserId`]): the frames
//!   that travel on the wire.
//! - **Notice** ([`DisconnectNotice`]): the `{ "id": ... }` body posted to
//!   the disconnect endpoint when the channel can't be used.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and presence
//! (connection state). It doesn't know about sockets or sessions. It only
//! knows how to serialize and deserialize frames.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Presence (Online/Offline)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{DisconnectNotice, Envelope, PresenceMessage, UserId};

/// The presence protocol version sent in every `Register` frame.
///
/// The server rejects registrations from clients speaking a different
/// version with an `Error` frame.
pub const PROTOCOL_VERSION: u32 = 1;
