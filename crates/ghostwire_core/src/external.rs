//! Interfaces to the collaborators that live outside the core.
//!
//! The game process supervisor and the chat platform client are injected as
//! trait objects. Nothing in the core calls either of them while holding a
//! state lock.

use async_trait::async_trait;

/// The supervised game server process.
#[async_trait]
pub trait GameProcess: Send + Sync {
    /// Whether the process is currently running and accepting input.
    fn is_running(&self) -> bool;

    /// Writes one command line to the process. Returns `false` if the
    /// command could not be delivered.
    async fn send(&self, command: &str) -> bool;
}

/// The chat platform client.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends plain text to a channel.
    async fn send_message(&self, channel_id: &str, text: &str) -> bool;

    /// Sends a structured embed to a channel.
    async fn send_embed(&self, channel_id: &str, embed: &serde_json::Value) -> bool;

    /// Sends plain text to a user's direct-message channel.
    async fn send_direct(&self, chat_id: &str, text: &str) -> bool;
}

impl std::fmt::Debug for dyn GameProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameProcess")
            .field("running", &self.is_running())
            .finish()
    }
}

impl std::fmt::Debug for dyn ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChatClient")
    }
}
