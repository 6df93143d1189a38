//! The process termination signal.

/// Resolves when the process is asked to stop: Ctrl-C everywhere, and
/// SIGTERM on Unix.
///
/// # Errors
/// Returns the I/O error if a signal handler can't be installed.
pub async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl-C");
                result
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM");
                Ok(())
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("received Ctrl-C");
        Ok(())
    }
}
