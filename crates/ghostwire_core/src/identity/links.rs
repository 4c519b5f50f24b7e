//! The persisted bidirectional link table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Chat account <-> game account links, stored in both directions.
///
/// The older field names written by earlier bridge versions are accepted
/// on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkTable {
    #[serde(default, alias = "discord_to_factorio")]
    pub discord_to_game: BTreeMap<String, String>,
    #[serde(default, alias = "factorio_to_discord")]
    pub game_to_discord: BTreeMap<String, String>,
}

impl LinkTable {
    /// Installs a link, first breaking any link either side already had.
    pub fn link(&mut self, chat_id: &str, game_account: &str) {
        if let Some(old_game) = self.discord_to_game.remove(chat_id) {
            self.game_to_discord.remove(&old_game);
        }
        if let Some(old_chat) = self.game_to_discord.remove(game_account) {
            self.discord_to_game.remove(&old_chat);
        }
        self.discord_to_game
            .insert(chat_id.to_string(), game_account.to_string());
        self.game_to_discord
            .insert(game_account.to_string(), chat_id.to_string());
    }

    /// Removes the link of `chat_id` in both directions.
    pub fn unlink(&mut self, chat_id: &str) -> Option<String> {
        let game_account = self.discord_to_game.remove(chat_id)?;
        self.game_to_discord.remove(&game_account);
        Some(game_account)
    }
}
