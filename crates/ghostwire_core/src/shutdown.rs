//! Shutdown coordination for background tasks.
//!
//! The verification sweep, the forwarder and the log worker run until the shared
//! [`ShutdownState`] is triggered, so they are stopped together with the
//! bridge instead of being left as detached timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Flag indicating shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    /// Wakes tasks parked in [`ShutdownState::wait`]
    notifier: Arc<watch::Sender<bool>>,
}

impl ShutdownState {
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(false);
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            notifier: Arc::new(notifier),
        }
    }

    /// Returns true once shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Initiates shutdown and wakes every waiting task.
    pub fn initiate_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notifier.send_replace(true);
        info!("🛑 Shutdown initiated - background tasks are stopping");
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.notifier.subscribe();
        if *rx.borrow_and_update() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}
