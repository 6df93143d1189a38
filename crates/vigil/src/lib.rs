//! # Vigil
//!
//! Presence and session lifecycle for authenticated clients.
//!
//! Vigil keeps a user's "online" status on the server in step with the
//! client's actual lifecycle. On start it reads the stored credentials,
//! checks the token, and opens a presence channel. When the client goes
//! away it makes sure the server hears that the user is offline. A normal
//! teardown, a logout, or an expired token closes the presence channel with
//! a going-offline frame. A termination signal skips the channel and falls
//! back from a durable spool to a blocking HTTP request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vigil::prelude::*;
//!
//! # async fn example() -> Result<(), VigilError> {
//! let config = ControllerConfig::new("wss://example.com/presence", "https://example.com/api")
//!     .spool_dir("/var/lib/vigil");
//! let mut controller = SessionController::new(
//!     FileCredentialStore::new("credentials.json"),
//!     WebSocketConnector::new(&config.presence_url),
//!     config,
//! )?;
//!
//! controller
//!     .run(async {
//!         let _ = termination_signal().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod error;
mod http;
mod liveness;
mod outbox;
mod signal;

pub use config::ControllerConfig;
pub use controller::{Session, SessionController, StartOutcome};
pub use error::VigilError;
pub use http::{ApiClient, HttpError};
pub use liveness::{ApiLivenessProbe, LivenessProbe};
pub use outbox::{FlushReport, MAX_REQUEUED, flush_spool};
pub use signal::termination_signal;

pub mod prelude {
    pub use crate::{
        ApiClient, ApiLivenessProbe, ControllerConfig, LivenessProbe, Session, SessionController,
        StartOutcome, VigilError, termination_signal,
    };
    pub use vigil_presence::{PresenceConfig, PresenceStatus};
    pub use vigil_protocol::UserId;
    pub use vigil_session::{
        ConnectionState, ControllerPhase, CredentialStore, FileCredentialStore,
        MemoryCredentialStore, UserProfile,
    };
    pub use vigil_shutdown::{NotifyOutcome, ShutdownTrigger, TierKind};
    pub use vigil_transport::WebSocketConnector;
}
