//! Routing of outbound events to the chat platform.
//!
//! Producers (the log pipeline and ghost transitions) never talk to the chat
//! client themselves. They push [`Outbound`] events into an [`Outbox`], which
//! is a cheap non-blocking channel send, so they can emit while holding
//! their own locks and still keep event order. The [`Forwarder`] task drains
//! the channel and performs the actual chat I/O. Raw console lines are
//! handed to a separate batching task that coalesces them into messages no
//! larger than the platform limit.

use crate::config::CoreConfig;
use crate::external::ChatClient;
use crate::shutdown::ShutdownState;
use crate::utils::{defuse_mentions, escape_markdown, render_template, truncate_chars};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// An event bound for the chat platform.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A player joined, real or synthesized
    PlayerJoined { name: String },
    /// A player left, real or synthesized, with the formatted play time
    PlayerLeft {
        name: String,
        play_time: Option<String>,
    },
    /// An in-game chat line
    Chat { text: String },
    /// A structured message produced by the in-game integration
    Embed { embed: serde_json::Value },
    /// A server lifecycle notice
    Notice { text: String },
    /// An allow-listed console message forwarded verbatim
    Passthrough { line: String },
    /// A raw line for the console channel
    Console { line: String },
}

/// Sending half of the outbound event channel.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Outbound) {
        if self.tx.send(event).is_err() {
            debug!("Forwarder stopped, dropping outbound event");
        }
    }
}

/// Delivers outbound events to the chat client.
pub struct Forwarder {
    chat: Arc<dyn ChatClient>,
    config: Arc<CoreConfig>,
    console: Option<mpsc::UnboundedSender<String>>,
}

impl Forwarder {
    pub fn new(chat: Arc<dyn ChatClient>, config: Arc<CoreConfig>) -> Self {
        Self {
            chat,
            config,
            console: None,
        }
    }

    /// Routes console lines into `console`, usually a [`ConsoleBatcher`].
    pub fn with_console(mut self, console: mpsc::UnboundedSender<String>) -> Self {
        self.console = Some(console);
        self
    }

    /// Delivers one event.
    pub async fn deliver(&self, event: Outbound) {
        let channel = self.config.main_channel_id.as_str();
        let templates = &self.config.messages;
        let delivered = match event {
            Outbound::PlayerJoined { name } => {
                let text = render_template(&templates.player_join, &name, "");
                self.send_text(channel, &text).await
            }
            Outbound::PlayerLeft { name, play_time } => {
                let text = match play_time {
                    Some(play_time) => {
                        render_template(&templates.player_leave_with_time, &name, &play_time)
                    }
                    None => render_template(&templates.player_leave, &name, ""),
                };
                self.send_text(channel, &text).await
            }
            Outbound::Chat { text } => {
                let text = if self.config.allow_pinging_everyone {
                    text
                } else {
                    defuse_mentions(&text)
                };
                self.send_text(channel, &text).await
            }
            Outbound::Embed { embed } => self.chat.send_embed(channel, &embed).await,
            Outbound::Notice { text } => self.send_text(channel, &text).await,
            Outbound::Passthrough { line } => self.send_text(channel, &line).await,
            Outbound::Console { line } => {
                if let Some(console) = &self.console {
                    if console.send(line).is_err() {
                        debug!("Console batcher stopped, dropping line");
                    }
                }
                true
            }
        };
        if !delivered {
            warn!("⚠️ Chat platform rejected an outbound message");
        }
    }

    async fn send_text(&self, channel: &str, text: &str) -> bool {
        let text = truncate_chars(text, self.config.limits.max_message_len);
        if text.trim().is_empty() {
            return true;
        }
        self.chat.send_message(channel, text).await
    }

    /// Drains `rx` until shutdown or until every [`Outbox`] is dropped.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<Outbound>, shutdown: ShutdownState) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("📤 Forwarder started");
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => self.deliver(event).await,
                        None => break,
                    },
                    _ = shutdown.wait() => {
                        while let Ok(event) = rx.try_recv() {
                            self.deliver(event).await;
                        }
                        break;
                    }
                }
            }
            info!("📤 Forwarder stopped");
        })
    }
}

/// Coalesces raw console lines into messages for the console channel.
///
/// A batch is flushed when the window since its first line elapses, or
/// before a line that would push it past the size limit.
pub struct ConsoleBatcher {
    chat: Arc<dyn ChatClient>,
    channel: String,
    window: Duration,
    limit: usize,
    buffer: String,
}

impl ConsoleBatcher {
    pub fn new(chat: Arc<dyn ChatClient>, channel: impl Into<String>, window: Duration, limit: usize) -> Self {
        Self {
            chat,
            channel: channel.into(),
            window,
            limit: limit.max(2),
            buffer: String::new(),
        }
    }

    /// Appends a line. Returns `true` when the line started a new batch.
    async fn push(&mut self, line: &str) -> bool {
        let line = escape_markdown(line);
        let line = truncate_chars(&line, self.limit - 1);
        if !self.buffer.is_empty() && self.buffer.len() + line.len() + 1 >= self.limit {
            self.flush().await;
        }
        let started = self.buffer.is_empty();
        if !started {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);
        started
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        if !self.chat.send_message(&self.channel, &batch).await {
            warn!("⚠️ Failed to deliver console batch to {}", self.channel);
        }
    }

    /// Runs the batcher until every sender of `rx` is dropped, flushing
    /// what is left. The forwarder owns the sender, so the batcher always
    /// outlives it and sees every line it forwarded.
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;
            loop {
                let timer = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));
                tokio::select! {
                    _ = timer, if deadline.is_some() => {
                        self.flush().await;
                        deadline = None;
                    }
                    line = rx.recv() => match line {
                        Some(line) => {
                            if self.push(&line).await {
                                deadline = Some(Instant::now() + self.window);
                            }
                        }
                        None => break,
                    },
                }
            }
            self.flush().await;
            debug!("Console batcher stopped");
        })
    }
}
