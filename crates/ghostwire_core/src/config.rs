//! Bridge configuration types and defaults.
//!
//! This module contains the configuration structure used to assemble the
//! bridge core: chat routing, command access, persistence paths, message
//! templates, timings and input limits.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure for the bridge core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Prefix that marks a chat message as a command (e.g. "!")
    pub command_prefix: String,

    /// Chat accounts allowed to use privileged commands
    pub admin_ids: Vec<String>,

    /// Channel receiving presence, chat and server notices
    pub main_channel_id: String,

    /// Channel receiving the batched raw console stream
    pub console_channel_id: Option<String>,

    /// Whether raw console lines are mirrored to the console channel
    pub enable_console_channel: bool,

    /// Whether `@here` / `@everyone` from the game may ping the chat
    pub allow_pinging_everyone: bool,

    /// Whether the game runs the integration mod that emits DISCORD lines
    pub integration_messages: bool,

    /// Verification code lifetime in seconds
    pub verification_ttl_secs: u64,

    /// Interval of the expired-verification sweep in seconds
    pub sweep_interval_secs: u64,

    /// Console batching window in milliseconds
    pub console_batch_ms: u64,

    /// Locations of the persisted JSON documents
    pub storage: StorageConfig,

    /// Outbound message templates
    pub messages: MessageTemplates,

    /// Size limits for inbound and outbound text
    pub limits: LimitsConfig,
}

/// Persisted state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub links_path: PathBuf,
    pub ghost_path: PathBuf,
    pub spy_path: PathBuf,
}

/// Outbound message templates. `{username}` and `{playtime}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplates {
    pub player_join: String,
    pub player_leave: String,
    pub player_leave_with_time: String,
    pub server_start: String,
    pub server_stop: String,
    pub server_fail: String,
    pub server_save: String,
}

/// Text size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum characters per outbound chat message
    pub max_message_len: usize,

    /// Lines longer than this are rejected before classification
    pub max_line_len: usize,

    /// Largest accepted DISCORD-EMBED payload in bytes
    pub max_embed_len: usize,
}

impl CoreConfig {
    pub fn verification_ttl(&self) -> Duration {
        Duration::from_secs(self.verification_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn console_batch_window(&self) -> Duration {
        Duration::from_millis(self.console_batch_ms.max(1))
    }

    pub fn is_admin(&self, chat_id: &str) -> bool {
        self.admin_ids.iter().any(|id| id == chat_id)
    }

    /// The console channel, if mirroring is enabled and a channel is set.
    pub fn console_channel(&self) -> Option<&str> {
        if !self.enable_console_channel {
            return None;
        }
        self.console_channel_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            admin_ids: Vec::new(),
            main_channel_id: String::new(),
            console_channel_id: None,
            enable_console_channel: false,
            allow_pinging_everyone: false,
            integration_messages: false,
            verification_ttl_secs: 5 * 60,
            sweep_interval_secs: 60,
            console_batch_ms: 2000,
            storage: StorageConfig::default(),
            messages: MessageTemplates::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            links_path: PathBuf::from("./verification.json"),
            ghost_path: PathBuf::from("./ghost_mode.json"),
            spy_path: PathBuf::from("./spy_mode.json"),
        }
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            player_join: "➡️ **{username}** joined the server".to_string(),
            player_leave: "⬅️ **{username}** left the server".to_string(),
            player_leave_with_time: "⬅️ **{username}** left the server (played {playtime})"
                .to_string(),
            server_start: "✅ Server started".to_string(),
            server_stop: "🛑 Server stopped".to_string(),
            server_fail: "❌ Server crashed".to_string(),
            server_save: "💾 Game saved".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_len: 2000,
            max_line_len: 64 * 1024,
            max_embed_len: 6000,
        }
    }
}
