//! Logging system setup and configuration.
//!
//! This module handles the initialization and configuration of the tracing-based
//! logging system with support for both human-readable and JSON output formats.

use crate::config::LoggingSettings;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system with the specified configuration.
///
/// Sets up tracing-subscriber with console output in either human-readable or
/// JSON form, plus an optional plain-text copy appended to a file.
///
/// # Arguments
///
/// * `config` - Logging configuration from the config file
/// * `json_format` - Whether to force JSON output format (CLI override)
///
/// # Returns
///
/// `Ok(())` if logging was set up successfully, or an error if the log file
/// could not be opened or a global subscriber is already installed.
///
/// # Features
///
/// * **Environment variable support** - `RUST_LOG` takes precedence over `config.level`
/// * **Log file** - When `file_path` is set, every event is also written there without ANSI colors
/// * **Thread information** - Includes thread IDs and names for debugging
///
/// # Example
///
/// ```rust,ignore
/// let settings = LoggingSettings {
///     level: "debug".to_string(),
///     json_format: false,
///     file_path: Some("ghostwire.log".to_string()),
/// };
/// setup_logging(&settings, false)?;
/// ```
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file_layer = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    if let Some(path) = &config.file_path {
        info!("📝 Also writing logs to {}", path);
    }
    Ok(())
}

/// Displays the startup banner.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║               👻 GHOSTWIRE 👻            ║");
    info!("║        Game console chat bridge v{}   ║", version);
    info!("║                                          ║");
    info!("║  🔗 Verified account linking             ║");
    info!("║  🕵️  Per-player spy filters                ║");
    info!("║  👻 Ghost mode                           ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
