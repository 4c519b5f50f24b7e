//! A chat client that writes every outbound message to the log.
//!
//! Used when no chat platform is wired in, so the bridge can be run and
//! observed against a real game server.

use async_trait::async_trait;
use ghostwire_core::ChatClient;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogChat;

#[async_trait]
impl ChatClient for LogChat {
    async fn send_message(&self, channel_id: &str, text: &str) -> bool {
        info!(target: "ghostwire::chat", channel = channel_id, "💬 {}", text);
        true
    }

    async fn send_embed(&self, channel_id: &str, embed: &serde_json::Value) -> bool {
        info!(target: "ghostwire::chat", channel = channel_id, "🧾 {}", embed);
        true
    }

    async fn send_direct(&self, chat_id: &str, text: &str) -> bool {
        info!(target: "ghostwire::chat", user = chat_id, "✉️ {}", text);
        true
    }
}
