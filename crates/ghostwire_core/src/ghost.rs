//! Ghost mode configuration.
//!
//! This module only owns the persisted per chat account flags and lists.
//! The transitions that also touch presence and spy mode live in
//! [`crate::visibility`], which serializes them.

use crate::error::{BridgeError, BridgeResult};
use crate::spy::LogCategory;
use crate::store::Persisted;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Per chat account ghost settings.
///
/// `enabled` and `pre_login` are never both true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GhostConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub pre_login: bool,
    /// Spy configuration to restore on deactivation
    #[serde(default)]
    pub previous_spy_mode: Vec<LogCategory>,
    #[serde(default)]
    pub auto_silent_commands: Vec<String>,
    #[serde(default)]
    pub fake_join_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub real_join_time: Option<DateTime<Utc>>,
}

impl GhostConfig {
    pub fn state(&self) -> GhostState {
        if self.enabled {
            GhostState::Active
        } else if self.pre_login {
            GhostState::PreLoginPending
        } else {
            GhostState::Inactive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostState {
    Inactive,
    PreLoginPending,
    Active,
}

/// Persisted ghost configuration, keyed by chat account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GhostTable {
    #[serde(default)]
    pub users: BTreeMap<String, GhostConfig>,
}

#[derive(Debug)]
pub struct GhostMode {
    table: Persisted<GhostTable>,
}

impl GhostMode {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            table: Persisted::open(path).await,
        }
    }

    pub async fn config(&self, chat_id: &str) -> GhostConfig {
        self.table
            .read(|table| table.users.get(chat_id).cloned().unwrap_or_default())
            .await
    }

    pub async fn state(&self, chat_id: &str) -> GhostState {
        self.table
            .read(|table| {
                table
                    .users
                    .get(chat_id)
                    .map(GhostConfig::state)
                    .unwrap_or(GhostState::Inactive)
            })
            .await
    }

    /// Chat accounts whose ghost mode is currently enabled.
    pub async fn enabled_accounts(&self) -> Vec<String> {
        self.table
            .read(|table| {
                table
                    .users
                    .iter()
                    .filter(|(_, config)| config.enabled)
                    .map(|(chat_id, _)| chat_id.clone())
                    .collect()
            })
            .await
    }

    /// Inactive -> PreLoginPending, saving the spy configuration.
    pub(crate) async fn set_pre_login(&self, chat_id: &str, saved_spy: Vec<LogCategory>) {
        self.table
            .update(|table| {
                let config = table.users.entry(chat_id.to_string()).or_default();
                config.previous_spy_mode = saved_spy;
                config.pre_login = true;
                config.enabled = false;
            })
            .await;
    }

    /// Marks ghost mode active. `saved_spy` replaces the saved spy
    /// configuration when given; pre-login activation keeps the one saved
    /// when it was armed.
    pub(crate) async fn set_active(
        &self,
        chat_id: &str,
        saved_spy: Option<Vec<LogCategory>>,
        now: DateTime<Utc>,
    ) {
        self.table
            .update(|table| {
                let config = table.users.entry(chat_id.to_string()).or_default();
                if let Some(saved) = saved_spy {
                    config.previous_spy_mode = saved;
                }
                config.enabled = true;
                config.pre_login = false;
                config.fake_join_time = Some(now);
                config.real_join_time = Some(now);
            })
            .await;
    }

    /// Clears both flags. Returns the configuration as it was before, or
    /// `None` when ghost mode was neither active nor pending.
    pub(crate) async fn deactivate(&self, chat_id: &str) -> Option<GhostConfig> {
        self.table
            .try_update(|table| {
                let config = table
                    .users
                    .get_mut(chat_id)
                    .filter(|config| config.enabled || config.pre_login)
                    .ok_or(())?;
                let previous = config.clone();
                config.enabled = false;
                config.pre_login = false;
                Ok::<_, ()>(previous)
            })
            .await
            .ok()
            .map(|(previous, _)| previous)
    }

    pub async fn auto_silent_commands(&self, chat_id: &str) -> Vec<String> {
        self.config(chat_id).await.auto_silent_commands
    }

    /// Adds an auto-silent command. Returns `false` if it was already listed.
    pub async fn add_auto_silent(&self, chat_id: &str, command: &str) -> BridgeResult<bool> {
        let command = command.trim();
        if command.is_empty() {
            return Err(BridgeError::InvalidInput("missing command".to_string()));
        }
        let (added, _) = self
            .table
            .update(|table| {
                let config = table.users.entry(chat_id.to_string()).or_default();
                if config.auto_silent_commands.iter().any(|c| c == command) {
                    return false;
                }
                config.auto_silent_commands.push(command.to_string());
                true
            })
            .await;
        if added {
            info!("⚡ Auto-silent command added for {}", chat_id);
        }
        Ok(added)
    }

    /// Removes the auto-silent command at 1-based `position`.
    pub async fn remove_auto_silent_at(&self, chat_id: &str, position: usize) -> BridgeResult<String> {
        let (removed, _) = self
            .table
            .try_update(|table| -> BridgeResult<String> {
                let commands = table
                    .users
                    .get_mut(chat_id)
                    .map(|config| &mut config.auto_silent_commands)
                    .filter(|commands| position >= 1 && position <= commands.len())
                    .ok_or_else(|| BridgeError::InvalidInput("invalid command number".to_string()))?;
                Ok(commands.remove(position - 1))
            })
            .await?;
        Ok(removed)
    }

    pub async fn clear_auto_silent(&self, chat_id: &str) {
        self.table
            .update(|table| {
                if let Some(config) = table.users.get_mut(chat_id) {
                    config.auto_silent_commands.clear();
                }
            })
            .await;
    }

    /// Whether an open command should be rerouted to silent execution.
    ///
    /// Matches when the first word (with `/` stripped) or the whole command
    /// equals a listed entry.
    pub async fn is_auto_silent(&self, chat_id: &str, command: &str) -> bool {
        let command = command.trim();
        let command = command.strip_prefix('/').unwrap_or(command);
        let Some(base) = command.split_whitespace().next() else {
            return false;
        };
        self.table
            .read(|table| {
                table.users.get(chat_id).is_some_and(|config| {
                    config.auto_silent_commands.iter().any(|entry| {
                        let entry = entry.strip_prefix('/').unwrap_or(entry);
                        entry == base || entry == command
                    })
                })
            })
            .await
    }

    pub fn persist_failures(&self) -> u64 {
        self.table.failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn ghost(dir: &TempDir) -> GhostMode {
        GhostMode::open(dir.path().join("ghost_mode.json")).await
    }

    #[tokio::test]
    async fn test_flags_are_exclusive() {
        let dir = TempDir::new().unwrap();
        let ghost = ghost(&dir).await;
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        ghost.set_pre_login("u1", vec![LogCategory::Chat]).await;
        assert_eq!(ghost.state("u1").await, GhostState::PreLoginPending);

        ghost.set_active("u1", None, now).await;
        let config = ghost.config("u1").await;
        assert!(config.enabled && !config.pre_login);
        assert_eq!(config.previous_spy_mode, vec![LogCategory::Chat]);
        assert_eq!(config.fake_join_time, Some(now));
    }

    #[tokio::test]
    async fn test_deactivate_inactive_returns_none() {
        let dir = TempDir::new().unwrap();
        let ghost = ghost(&dir).await;
        assert!(ghost.deactivate("u1").await.is_none());
        assert!(!dir.path().join("ghost_mode.json").exists());
    }

    #[tokio::test]
    async fn test_auto_silent_matching() {
        let dir = TempDir::new().unwrap();
        let ghost = ghost(&dir).await;
        assert!(ghost.add_auto_silent("u1", "editor").await.unwrap());
        assert!(ghost.add_auto_silent("u1", "/c").await.unwrap());
        assert!(!ghost.add_auto_silent("u1", "editor").await.unwrap());

        assert!(ghost.is_auto_silent("u1", "/editor").await);
        assert!(ghost.is_auto_silent("u1", "c game.speed = 2").await);
        assert!(!ghost.is_auto_silent("u1", "kick Bob").await);
        assert!(!ghost.is_auto_silent("u2", "editor").await);
        assert!(!ghost.is_auto_silent("u1", "   ").await);
    }

    #[tokio::test]
    async fn test_remove_auto_silent_by_position() {
        let dir = TempDir::new().unwrap();
        let ghost = ghost(&dir).await;
        ghost.add_auto_silent("u1", "editor").await.unwrap();
        ghost.add_auto_silent("u1", "cheat").await.unwrap();

        assert_eq!(ghost.remove_auto_silent_at("u1", 1).await.unwrap(), "editor");
        assert!(ghost.remove_auto_silent_at("u1", 5).await.is_err());
        assert!(ghost.remove_auto_silent_at("u1", 0).await.is_err());
        assert_eq!(ghost.auto_silent_commands("u1").await, vec!["cheat".to_string()]);

        ghost.clear_auto_silent("u1").await;
        assert!(ghost.auto_silent_commands("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_reads_legacy_zero_times() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ghost_mode.json");
        std::fs::write(
            &path,
            r#"{"users":{"u1":{"enabled":false,"pre_login":true,"previous_spy_mode":["JOIN"],
            "auto_silent_commands":[],"fake_join_time":"0001-01-01T00:00:00Z",
            "real_join_time":"0001-01-01T00:00:00Z"}}}"#,
        )
        .unwrap();

        let ghost = GhostMode::open(&path).await;
        assert_eq!(ghost.state("u1").await, GhostState::PreLoginPending);
        assert_eq!(ghost.config("u1").await.previous_spy_mode, vec![LogCategory::Join]);
    }
}
