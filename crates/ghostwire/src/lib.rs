//! # Ghostwire - Main Entry Point
//!
//! Runs a game server as a child process and bridges its console with a chat
//! platform. This entry point handles CLI parsing, configuration loading,
//! and application lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! ghostwire
//!
//! # Specify custom configuration
//! ghostwire --config production.toml
//!
//! # Override specific settings
//! ghostwire --executable /opt/factorio/bin/x64/factorio --log-level debug
//!
//! # JSON logging for production
//! ghostwire --json-logs
//! ```
//!
//! ## Configuration
//!
//! The bridge loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Operator console
//!
//! Lines typed on stdin are written to the game. A line of the form
//! `@<chat id> <command>` runs a chat command as that chat account.
//!
//! ## Signal Handling
//!
//! The bridge shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM. A second
//! signal exits immediately.

use tracing::error;

mod app;
mod chat;
mod cli;
mod config;
mod game;
mod logging;
mod operator;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the Ghostwire bridge.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Called from an async context (`main` with `#[tokio::main]`).
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{BridgeSettings, GameSettings, LoggingSettings, StorageSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let core = config.to_core_config();
        assert_eq!(core.command_prefix, "!");
        assert!(core.console_channel().is_none());
    }

    #[tokio::test]
    async fn test_application_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("config.toml"),
            log_level: Some("debug".to_string()),
            json_logs: true,
            executable: Some("/usr/bin/true".to_string()),
        };

        let app = Application::new(args.clone()).await.unwrap();
        assert!(args.config_path.exists());
        drop(app);

        let written = AppConfig::load_from_file(&args.config_path).await.unwrap();
        assert_eq!(written.logging.level, "info");
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("config.toml"),
            log_level: Some("chatty".to_string()),
            json_logs: false,
            executable: None,
        };
        let err = Application::new(args).await.err().unwrap();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_cli_struct() {
        let args = CliArgs {
            config_path: PathBuf::from("test.toml"),
            log_level: None,
            json_logs: false,
            executable: None,
        };
        assert_eq!(args.config_path, PathBuf::from("test.toml"));
    }
}
