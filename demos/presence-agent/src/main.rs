use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use vigil::prelude::*;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PRESENCE_URL_VAR: &str = "VIGIL_PRESENCE_URL";
const API_URL_VAR: &str = "VIGIL_API_URL";
const CREDENTIALS_VAR: &str = "VIGIL_CREDENTIALS";
const SPOOL_DIR_VAR: &str = "VIGIL_SPOOL_DIR";

struct AgentConfig {
    controller: ControllerConfig,
    credentials: PathBuf,
}

/// Builds the agent config from a variable lookup. Unset variables fall back
/// to the controller defaults and `./credentials.json`.
fn config_from(lookup: impl Fn(&str) -> Option<String>) -> AgentConfig {
    let defaults = ControllerConfig::default();
    let mut controller = ControllerConfig::new(
        lookup(PRESENCE_URL_VAR).unwrap_or(defaults.presence_url),
        lookup(API_URL_VAR).unwrap_or(defaults.api_base_url),
    );
    if let Some(dir) = lookup(SPOOL_DIR_VAR) {
        controller = controller.spool_dir(dir);
    }
    AgentConfig {
        controller,
        credentials: lookup(CREDENTIALS_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("credentials.json")),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let AgentConfig {
        controller: config,
        credentials,
    } = config_from(|key| std::env::var(key).ok());
    tracing::info!(
        presence = %config.presence_url,
        api = %config.api_base_url,
        credentials = %credentials.display(),
        "starting presence agent"
    );

    let connector = WebSocketConnector::new(&config.presence_url);
    let mut controller =
        SessionController::new(FileCredentialStore::new(credentials), connector, config)?;

    let outcome = controller
        .run(async {
            if let Err(e) = termination_signal().await {
                tracing::error!(error = %e, "cannot listen for termination signals");
            }
        })
        .await?;

    tracing::info!(?outcome, "presence agent stopped");
    Ok(())
}
