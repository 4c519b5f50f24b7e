//! In-memory collaborator doubles for unit and scenario tests.

use crate::external::{ChatClient, GameProcess};
use crate::identity::CodeGenerator;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A game process that records every command sent to it.
#[derive(Debug)]
pub struct FakeGame {
    running: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl FakeGame {
    pub fn running() -> Self {
        Self {
            running: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameProcess for FakeGame {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn send(&self, command: &str) -> bool {
        if !self.is_running() {
            return false;
        }
        self.sent.lock().unwrap().push(command.to_string());
        true
    }
}

/// One message delivered to [`RecordingChat`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivered {
    Channel { channel: String, text: String },
    Embed { channel: String, embed: serde_json::Value },
    Direct { chat_id: String, text: String },
}

/// A chat client that records everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingChat {
    delivered: Mutex<Vec<Delivered>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    /// Texts sent to `channel`, in order.
    pub fn channel_texts(&self, channel: &str) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter_map(|d| match d {
                Delivered::Channel { channel: c, text } if c == channel => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Direct messages sent to `chat_id`, in order.
    pub fn direct_texts(&self, chat_id: &str) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter_map(|d| match d {
                Delivered::Direct { chat_id: c, text } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(&self, channel_id: &str, text: &str) -> bool {
        self.delivered.lock().unwrap().push(Delivered::Channel {
            channel: channel_id.to_string(),
            text: text.to_string(),
        });
        true
    }

    async fn send_embed(&self, channel_id: &str, embed: &serde_json::Value) -> bool {
        self.delivered.lock().unwrap().push(Delivered::Embed {
            channel: channel_id.to_string(),
            embed: embed.clone(),
        });
        true
    }

    async fn send_direct(&self, chat_id: &str, text: &str) -> bool {
        self.delivered.lock().unwrap().push(Delivered::Direct {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        true
    }
}

/// Hands out a fixed sequence of codes, repeating the last one.
#[derive(Debug)]
pub struct FixedCodes {
    codes: Vec<String>,
    next: AtomicUsize,
}

impl FixedCodes {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: codes.iter().map(|c| c.to_string()).collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl CodeGenerator for FixedCodes {
    fn generate(&self) -> String {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let index = index.min(self.codes.len().saturating_sub(1));
        self.codes.get(index).cloned().unwrap_or_else(|| "000000".to_string())
    }
}
