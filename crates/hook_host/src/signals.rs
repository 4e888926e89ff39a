//! Shutdown signal handling.

use tokio::signal;
use tracing::info;

/// Resolves once SIGINT or SIGTERM (Ctrl+C on Windows) arrives.
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}
