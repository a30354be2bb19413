//! Ctrl+C / SIGTERM wiring for long-running commands.

use tokio::signal;
use tokio::sync::watch;

/// Spawn a task that flips the returned receiver to `true` on the first
/// Ctrl+C or SIGTERM.
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = wait_for_sigterm() => {
                tracing::info!("Received SIGTERM signal");
            }
        }

        tracing::info!("Starting graceful shutdown...");
        let _ = tx.send(true);
    });

    rx
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await
        }
    }
}

/// SIGTERM does not exist on this platform; only Ctrl+C ends the wait.
#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
