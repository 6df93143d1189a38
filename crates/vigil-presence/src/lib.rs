//! Presence channel lifecycle for Vigil.
//!
//! A [`PresenceConnection`] keeps at most one channel to the presence server
//! open per session and mirrors it in a [`ConnectionState`]:
//!
//! - [`open`](PresenceConnection::open) registers the user and goes online
//! - [`close`](PresenceConnection::close) sends the offline notice and
//!   closes the channel
//! - [`abandon`](PresenceConnection::abandon) drops the channel without a
//!   notice, for process termination
//! - [`PresenceStatus`] lets UI code watch the state without owning the
//!   connection
//!
//! The connection also implements [`GracefulChannel`](vigil_shutdown::GracefulChannel),
//! so the shutdown notifier can use its graceful close as the first delivery
//! tier.
//!
//! [`ConnectionState`]: vigil_session::ConnectionState

mod config;
mod connection;
mod error;
mod status;

pub use config::PresenceConfig;
pub use connection::{CloseOutcome, PresenceConnection};
pub use error::ConnectionError;
pub use status::PresenceStatus;
