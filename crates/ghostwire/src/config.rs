//! Configuration management for the Ghostwire bridge.
//!
//! This module handles loading, validation, and conversion of the bridge
//! configuration from TOML files and command-line arguments.

use ghostwire_core::config::{LimitsConfig, MessageTemplates, StorageConfig};
use ghostwire_core::CoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat routing and command access
    pub bridge: BridgeSettings,
    /// The supervised game server process
    pub game: GameSettings,
    /// Locations of the persisted JSON documents
    #[serde(default)]
    pub storage: StorageSettings,
    /// Outbound message templates
    #[serde(default)]
    pub messages: MessageTemplates,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Chat-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Prefix that marks a chat message as a command
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Chat accounts allowed to use privileged commands
    #[serde(default)]
    pub admin_ids: Vec<String>,
    /// Channel receiving presence, chat and server notices
    #[serde(default)]
    pub main_channel_id: String,
    /// Channel receiving the raw console mirror
    #[serde(default)]
    pub console_channel_id: Option<String>,
    #[serde(default)]
    pub enable_console_channel: bool,
    #[serde(default)]
    pub allow_pinging_everyone: bool,
    /// Whether the in-game integration emits DISCORD and DISCORD-EMBED lines
    #[serde(default)]
    pub integration_messages: bool,
}

fn default_command_prefix() -> String {
    "!".to_string()
}

/// Game process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    /// Path of the game server executable
    pub executable: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
}

/// Persisted state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub links_path: String,
    pub ghost_path: String,
    pub spy_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            links_path: "./verification.json".to_string(),
            ghost_path: "./ghost_mode.json".to_string(),
            spy_path: "./spy_mode.json".to_string(),
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeSettings {
                command_prefix: default_command_prefix(),
                admin_ids: vec![],
                main_channel_id: String::new(),
                console_channel_id: None,
                enable_console_channel: false,
                allow_pinging_everyone: false,
                integration_messages: false,
            },
            game: GameSettings {
                executable: "./bin/x64/factorio".to_string(),
                args: vec![
                    "--start-server".to_string(),
                    "./saves/world.zip".to_string(),
                ],
            },
            storage: StorageSettings::default(),
            messages: MessageTemplates::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration into the bridge core configuration.
    ///
    /// Timings and size limits are not exposed in the file and keep the core defaults.
    pub fn to_core_config(&self) -> CoreConfig {
        let defaults = CoreConfig::default();
        CoreConfig {
            command_prefix: self.bridge.command_prefix.clone(),
            admin_ids: self.bridge.admin_ids.clone(),
            main_channel_id: self.bridge.main_channel_id.clone(),
            console_channel_id: self.bridge.console_channel_id.clone(),
            enable_console_channel: self.bridge.enable_console_channel,
            allow_pinging_everyone: self.bridge.allow_pinging_everyone,
            integration_messages: self.bridge.integration_messages,
            storage: StorageConfig {
                links_path: PathBuf::from(&self.storage.links_path),
                ghost_path: PathBuf::from(&self.storage.ghost_path),
                spy_path: PathBuf::from(&self.storage.spy_path),
            },
            messages: self.messages.clone(),
            limits: LimitsConfig::default(),
            ..defaults
        }
    }

    /// Validates the configuration for common errors.
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.bridge.command_prefix.trim().is_empty() {
            return Err("Command prefix cannot be empty".to_string());
        }

        if self.bridge.enable_console_channel
            && self
                .bridge
                .console_channel_id
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err("Console channel is enabled but console_channel_id is not set".to_string());
        }

        if self.game.executable.trim().is_empty() {
            return Err("Game executable cannot be empty".to_string());
        }

        for (name, path) in [
            ("links_path", &self.storage.links_path),
            ("ghost_path", &self.storage.ghost_path),
            ("spy_path", &self.storage.spy_path),
        ] {
            if path.trim().is_empty() {
                return Err(format!("storage.{name} cannot be empty"));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.bridge.command_prefix, "!");
        assert!(config.bridge.admin_ids.is_empty());
        assert!(!config.bridge.enable_console_channel);
        assert_eq!(config.storage.links_path, "./verification.json");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.bridge.command_prefix, "!");
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.game.executable, config.game.executable);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[bridge]
command_prefix = "$"
admin_ids = ["111", "222"]
main_channel_id = "main"
console_channel_id = "console"
enable_console_channel = true
integration_messages = true

[game]
executable = "/opt/factorio/bin/x64/factorio"
args = ["--start-server-load-latest"]

[storage]
links_path = "/var/lib/ghostwire/links.json"
ghost_path = "/var/lib/ghostwire/ghost.json"
spy_path = "/var/lib/ghostwire/spy.json"

[logging]
level = "debug"
json_format = true
"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.bridge.command_prefix, "$");
        assert_eq!(config.bridge.admin_ids, vec!["111".to_string(), "222".to_string()]);
        assert_eq!(config.game.args, vec!["--start-server-load-latest".to_string()]);
        assert!(config.logging.json_format);
        assert_eq!(config.logging.file_path, None);
        // Missing [messages] falls back to the defaults
        assert_eq!(config.messages.server_save, MessageTemplates::default().server_save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_core_config_conversion() {
        let mut config = AppConfig::default();
        config.bridge.admin_ids = vec!["42".to_string()];
        config.bridge.console_channel_id = Some("console".to_string());
        config.bridge.enable_console_channel = true;
        config.storage.spy_path = "/tmp/spy.json".to_string();
        config.messages.player_join = "{username} is here".to_string();

        let core = config.to_core_config();
        assert!(core.is_admin("42"));
        assert_eq!(core.console_channel(), Some("console"));
        assert_eq!(core.storage.spy_path, PathBuf::from("/tmp/spy.json"));
        assert_eq!(core.messages.player_join, "{username} is here");
        assert_eq!(core.verification_ttl_secs, 300);
        assert_eq!(core.limits.max_message_len, 2000);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.bridge.command_prefix = " ".to_string();
        assert!(config.validate().unwrap_err().contains("prefix"));

        let mut config = AppConfig::default();
        config.game.executable = String::new();
        assert!(config.validate().unwrap_err().contains("executable"));

        let mut config = AppConfig::default();
        config.storage.ghost_path = String::new();
        assert!(config.validate().unwrap_err().contains("storage.ghost_path"));

        let mut config = AppConfig::default();
        config.bridge.enable_console_channel = true;
        assert!(config.validate().unwrap_err().contains("console_channel_id"));
    }

    #[test]
    fn test_validation_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level '{}' should be valid", level);
        }

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }
}
