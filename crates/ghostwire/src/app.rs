//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that starts the game
//! server, wires it to the bridge, and drives the phased shutdown.

use crate::{
    chat::LogChat,
    cli::CliArgs,
    config::AppConfig,
    game::ChildGame,
    logging::display_banner,
    operator,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use futures::future::join_all;
use ghostwire_core::classifier::EngineSignal;
use ghostwire_core::{Bridge, ChatClient, Collaborators, GameProcess, ShutdownState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Capacity of the channel between the game's output readers and the log worker.
const LOG_CHANNEL_CAPACITY: usize = 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(8);

/// Main application struct.
///
/// Owns the merged configuration and drives the bridge from startup to
/// shutdown.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
}

impl Application {
    /// Loads configuration, applies CLI overrides and validates the result.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Some(executable) = args.executable {
            config.game.executable = executable;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        Ok(Self { config })
    }

    /// Runs the bridge until a termination signal arrives, then drains the
    /// background tasks.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Ghostwire");
        self.log_configuration_summary();

        let shutdown = ShutdownState::new();

        let core = self.config.to_core_config();
        let (lines_tx, lines_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (game, game_handle) =
            ChildGame::spawn(&self.config.game, core.limits.max_line_len, lines_tx, shutdown.clone())?;
        let game: Arc<dyn GameProcess> = game;
        let chat: Arc<dyn ChatClient> = Arc::new(LogChat);

        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let lifecycle_handle = spawn_lifecycle_logger(lifecycle_rx);

        let collaborators = Collaborators {
            lifecycle: Some(lifecycle_tx),
            ..Collaborators::new(game.clone(), chat)
        };
        let bridge = Arc::new(Bridge::open(core, collaborators).await);

        let mut handles = bridge.start(&shutdown).await?;
        handles.push(bridge.spawn_log_worker(lines_rx, shutdown.clone()));
        let operator_handle = operator::spawn(bridge.clone(), game, shutdown.clone());

        info!("✅ Ghostwire is now running!");
        info!("⌨️ Type game commands, or `@<chat id> <command>` to act as a chat user");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers(&shutdown).await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        // Stop reading operator input
        operator_handle.abort();
        let _ = operator_handle.await;

        // Let the game quit and flush its remaining output
        info!("🎮 Phase 1: Stopping the game server...");
        if tokio::time::timeout(DRAIN_TIMEOUT * 2, game_handle).await.is_err() {
            warn!("⏰ Game supervisor did not finish in time");
        }

        // Drain the bridge tasks
        info!("⏳ Phase 2: Draining bridge tasks...");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, join_all(handles)).await;
        match drained {
            Ok(results) => {
                let failed = results.iter().filter(|r| r.is_err()).count();
                if failed > 0 {
                    warn!("⚠️ {} bridge task(s) ended abnormally", failed);
                } else {
                    info!("✅ Bridge tasks completed gracefully");
                }
            }
            Err(_) => warn!("⏰ Bridge tasks did not complete within {:?}", DRAIN_TIMEOUT),
        }

        drop(bridge);
        if tokio::time::timeout(DRAIN_TIMEOUT, lifecycle_handle).await.is_err() {
            warn!("⏰ Lifecycle logger did not finish in time");
        }

        info!("✅ Ghostwire shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        let bridge = &self.config.bridge;
        info!("📋 Configuration Summary:");
        info!("  🎮 Game: {} {}", self.config.game.executable, self.config.game.args.join(" "));
        info!("  ⌨️ Command prefix: {}", bridge.command_prefix);
        info!("  🛡️ Admins: {}", bridge.admin_ids.len());
        info!("  💬 Main channel: {}", bridge.main_channel_id);
        match (&bridge.console_channel_id, bridge.enable_console_channel) {
            (Some(channel), true) => info!("  🖥️ Console channel: {}", channel),
            _ => info!("  🖥️ Console channel: disabled"),
        }
        info!("  🔌 Integration messages: {}", bridge.integration_messages);
        info!("  💾 Links: {}", self.config.storage.links_path);
    }
}

/// Logs engine signals until the bridge drops its sender.
fn spawn_lifecycle_logger(mut rx: mpsc::UnboundedReceiver<EngineSignal>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            match signal {
                EngineSignal::GameId(id) => info!("🆔 Game id: {}", id),
                other => info!("🔄 Game lifecycle: {:?}", other),
            }
        }
    })
}
