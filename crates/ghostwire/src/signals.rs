//! Signal handling for graceful bridge shutdown.
//!
//! A first signal initiates shutdown on the shared [`ShutdownState`] so the
//! background tasks drain. A second signal while draining is handled by the
//! caller as a forced exit.

use ghostwire_core::ShutdownState;
use tokio::signal;
use tracing::info;

/// Waits for a termination signal and initiates shutdown.
///
/// Returns once SIGINT or SIGTERM (Ctrl+C on Windows) arrives, after the
/// shared shutdown state has been triggered so the game supervisor and the
/// bridge tasks start draining.
///
/// # Arguments
///
/// * `shutdown` - The shutdown state shared with the game supervisor and the bridge tasks
///
/// # Platform Support
///
/// * **Unix platforms**: Handles SIGINT and SIGTERM signals
/// * **Windows**: Handles Ctrl+C signal
///
/// # Returns
///
/// `Ok(())` once a signal was received and shutdown initiated, or an error if
/// the signal handlers could not be installed.
///
/// # Example
///
/// ```rust,ignore
/// use ghostwire_core::ShutdownState;
///
/// let shutdown = ShutdownState::new();
/// // Start the game and the bridge with `shutdown.clone()`...
///
/// setup_signal_handlers(&shutdown).await?;
/// assert!(shutdown.is_shutdown_initiated());
/// ```
pub async fn setup_signal_handlers(shutdown: &ShutdownState) -> Result<(), Box<dyn std::error::Error>> {
    setup_signal_handlers_silent().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    shutdown.initiate_shutdown();
    Ok(())
}

/// Waits for the next termination signal without touching any state.
///
/// Used after a graceful shutdown has begun, so a second signal can force
/// the process to exit.
///
/// # Returns
///
/// `Ok(())` when a signal arrives, or an error if the handlers could not be
/// installed.
///
/// # Example
///
/// ```rust,ignore
/// tokio::spawn(async move {
///     if setup_signal_handlers_silent().await.is_ok() {
///         std::process::exit(1);
///     }
/// });
/// ```
pub async fn setup_signal_handlers_silent() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}
