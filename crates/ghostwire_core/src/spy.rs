//! Spy mode: per chat account log suppression.
//!
//! Each linked chat account may name log categories that must not be
//! forwarded for its game account. `ALL` suppresses every category.

use crate::error::BridgeError;
use crate::store::Persisted;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Closed vocabulary of log categories understood by the bridge and the
/// in-game integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogCategory {
    All,
    Join,
    Leave,
    Chat,
    Died,
    Kicked,
    Muted,
    BuiltEntity,
    MinedEntity,
    Research,
    Command,
    EntityDestroyed,
    ChunkGenerated,
    SectorScanned,
}

impl LogCategory {
    pub const VARIANTS: [LogCategory; 14] = [
        LogCategory::All,
        LogCategory::Join,
        LogCategory::Leave,
        LogCategory::Chat,
        LogCategory::Died,
        LogCategory::Kicked,
        LogCategory::Muted,
        LogCategory::BuiltEntity,
        LogCategory::MinedEntity,
        LogCategory::Research,
        LogCategory::Command,
        LogCategory::EntityDestroyed,
        LogCategory::ChunkGenerated,
        LogCategory::SectorScanned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::All => "ALL",
            LogCategory::Join => "JOIN",
            LogCategory::Leave => "LEAVE",
            LogCategory::Chat => "CHAT",
            LogCategory::Died => "DIED",
            LogCategory::Kicked => "KICKED",
            LogCategory::Muted => "MUTED",
            LogCategory::BuiltEntity => "BUILT_ENTITY",
            LogCategory::MinedEntity => "MINED_ENTITY",
            LogCategory::Research => "RESEARCH",
            LogCategory::Command => "COMMAND",
            LogCategory::EntityDestroyed => "ENTITY_DESTROYED",
            LogCategory::ChunkGenerated => "CHUNK_GENERATED",
            LogCategory::SectorScanned => "SECTOR_SCANNED",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        LogCategory::VARIANTS
            .iter()
            .copied()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| BridgeError::InvalidInput(format!("unknown log type `{}`", s.trim())))
    }
}

/// Joins categories for display, e.g. `JOIN, CHAT`.
pub fn join_categories(categories: &[LogCategory]) -> String {
    categories
        .iter()
        .map(LogCategory::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Persisted spy configuration, keyed by chat account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpyTable {
    #[serde(default)]
    pub suppressed_logs: BTreeMap<String, Vec<LogCategory>>,
}

/// Spy configuration service.
#[derive(Debug)]
pub struct SpyMode {
    table: Persisted<SpyTable>,
}

impl SpyMode {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            table: Persisted::open(path).await,
        }
    }

    /// Suppressed categories in insertion order. Empty means no suppression.
    pub async fn list(&self, chat_id: &str) -> Vec<LogCategory> {
        self.table
            .read(|table| table.suppressed_logs.get(chat_id).cloned().unwrap_or_default())
            .await
    }

    /// Adds a category. Returns the updated list.
    pub async fn add(&self, chat_id: &str, category: LogCategory) -> Vec<LogCategory> {
        let (list, _) = self
            .table
            .update(|table| {
                let list = table.suppressed_logs.entry(chat_id.to_string()).or_default();
                if !list.contains(&category) {
                    list.push(category);
                }
                list.clone()
            })
            .await;
        info!("🕵️ Spy mode for {} now suppresses [{}]", chat_id, join_categories(&list));
        list
    }

    /// Removes a category. Returns the updated list.
    pub async fn remove(&self, chat_id: &str, category: LogCategory) -> Vec<LogCategory> {
        let (list, _) = self
            .table
            .update(|table| {
                let Some(list) = table.suppressed_logs.get_mut(chat_id) else {
                    return Vec::new();
                };
                list.retain(|c| *c != category);
                let list = list.clone();
                if list.is_empty() {
                    table.suppressed_logs.remove(chat_id);
                }
                list
            })
            .await;
        info!("🕵️ Spy mode for {} now suppresses [{}]", chat_id, join_categories(&list));
        list
    }

    /// Removes every category. Returns what was suppressed before.
    pub async fn clear(&self, chat_id: &str) -> Vec<LogCategory> {
        let (previous, _) = self
            .table
            .update(|table| table.suppressed_logs.remove(chat_id).unwrap_or_default())
            .await;
        info!("🕵️ Spy mode cleared for {}", chat_id);
        previous
    }

    /// Replaces the whole list, used when ghost mode restores a saved config.
    pub async fn replace(&self, chat_id: &str, categories: Vec<LogCategory>) {
        self.table
            .update(|table| {
                if categories.is_empty() {
                    table.suppressed_logs.remove(chat_id);
                } else {
                    table.suppressed_logs.insert(chat_id.to_string(), categories);
                }
            })
            .await;
    }

    /// Whether events of `category` are dropped for `chat_id`.
    pub async fn suppresses(&self, chat_id: &str, category: LogCategory) -> bool {
        self.table
            .read(|table| {
                table.suppressed_logs.get(chat_id).is_some_and(|list| {
                    list.iter().any(|c| *c == LogCategory::All || *c == category)
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
    use tempfile::TempDir;

    async fn spy(dir: &TempDir) -> SpyMode {
        SpyMode::open(dir.path().join("spy_mode.json")).await
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("join".parse::<LogCategory>().unwrap(), LogCategory::Join);
        assert_eq!(
            "built_entity".parse::<LogCategory>().unwrap(),
            LogCategory::BuiltEntity
        );
        assert!(matches!(
            "teleport".parse::<LogCategory>(),
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_category_serializes_like_display() {
        for category in LogCategory::VARIANTS {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
    }

    #[tokio::test]
    async fn test_add_is_ordered_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let spy = spy(&dir).await;
        spy.add("u1", LogCategory::Chat).await;
        spy.add("u1", LogCategory::Join).await;
        let list = spy.add("u1", LogCategory::Chat).await;
        assert_eq!(list, vec![LogCategory::Chat, LogCategory::Join]);
    }

    #[tokio::test]
    async fn test_wildcard_suppresses_everything() {
        let dir = TempDir::new().unwrap();
        let spy = spy(&dir).await;
        assert!(!spy.suppresses("u1", LogCategory::Chat).await);

        spy.add("u1", LogCategory::All).await;
        assert!(spy.suppresses("u1", LogCategory::Chat).await);
        assert!(spy.suppresses("u1", LogCategory::Leave).await);
        assert!(!spy.suppresses("u2", LogCategory::Chat).await);
    }

    #[tokio::test]
    async fn test_clear_on_empty_config() {
        let dir = TempDir::new().unwrap();
        let spy = spy(&dir).await;
        assert!(spy.clear("u1").await.is_empty());
        assert!(spy.list("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_last_category_drops_entry() {
        let dir = TempDir::new().unwrap();
        let spy = spy(&dir).await;
        spy.add("u1", LogCategory::Died).await;
        assert!(spy.remove("u1", LogCategory::Died).await.is_empty());
        assert!(spy.remove("u1", LogCategory::Died).await.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let spy = spy(&dir).await;
            spy.add("u1", LogCategory::Join).await;
            spy.add("u1", LogCategory::Muted).await;
        }
        let reopened = spy(&dir).await;
        assert_eq!(
            reopened.list("u1").await,
            vec![LogCategory::Join, LogCategory::Muted]
        );
    }
}
