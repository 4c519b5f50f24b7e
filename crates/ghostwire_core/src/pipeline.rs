//! The log line worker.
//!
//! Lines are processed strictly in arrival order by a single consumer. Each
//! line is classified, presence and ghost state are updated, suppression is
//! applied and whatever survives becomes an [`Outbound`] event.

use crate::classifier::{classify, ChatTag, Classified, EngineSignal};
use crate::config::CoreConfig;
use crate::forwarder::{Outbound, Outbox};
use crate::shutdown::ShutdownState;
use crate::utils::escape_markdown;
use crate::visibility::VisibilityService;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Marker of chat lines the server itself echoes back.
const SERVER_ECHO: &str = "<server>";

pub struct LogPipeline {
    config: Arc<CoreConfig>,
    visibility: Arc<VisibilityService>,
    outbox: Outbox,
    lifecycle: Option<mpsc::UnboundedSender<EngineSignal>>,
    game_id: RwLock<Option<String>>,
}

impl LogPipeline {
    pub fn new(config: Arc<CoreConfig>, visibility: Arc<VisibilityService>, outbox: Outbox) -> Self {
        Self {
            config,
            visibility,
            outbox,
            lifecycle: None,
            game_id: RwLock::new(None),
        }
    }

    /// Publishes every engine signal on `lifecycle` as well.
    pub fn with_lifecycle(mut self, lifecycle: mpsc::UnboundedSender<EngineSignal>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// The last matching-server game id seen in the log.
    pub async fn game_id(&self) -> Option<String> {
        self.game_id.read().await.clone()
    }

    /// Processes one newline-stripped line of game output.
    pub async fn on_log_line(&self, line: &str) {
        let classified = classify(line, self.config.limits.max_line_len);
        match &classified {
            Classified::Noise => return,
            Classified::Rejected { len } => {
                warn!("⚠️ Rejected a {} byte log line", len);
                return;
            }
            _ => {}
        }

        let presence = self.visibility.presence();
        let mentioned_before = presence.hidden_mentioned_in(line).await;
        let subject = classified.subject().map(str::to_string);
        let mut hidden_leave = false;

        match classified {
            Classified::Chat { tag, payload } => {
                hidden_leave = self
                    .handle_chat(tag, payload, subject.as_deref(), mentioned_before)
                    .await;
            }
            Classified::Engine(signals) => {
                for signal in signals {
                    self.handle_signal(signal).await;
                }
            }
            Classified::Passthrough(text) => {
                if !mentioned_before {
                    self.outbox.emit(Outbound::Passthrough { line: text });
                }
            }
            Classified::Dropped | Classified::Noise | Classified::Rejected { .. } => {}
        }

        let hidden = hidden_leave || mentioned_before || presence.hidden_mentioned_in(line).await;
        if !hidden {
            self.outbox.emit(Outbound::Console {
                line: line.trim().to_string(),
            });
        }
    }

    /// Returns `true` when the line was the LEAVE of a hidden account.
    async fn handle_chat(
        &self,
        tag: ChatTag,
        payload: String,
        subject: Option<&str>,
        mentioned_before: bool,
    ) -> bool {
        match tag {
            ChatTag::Join => {
                if let Some(account) = subject {
                    self.visibility.handle_join(account, mentioned_before).await;
                }
            }
            ChatTag::Leave => {
                if let Some(account) = subject {
                    return self.visibility.handle_leave(account, mentioned_before).await;
                }
            }
            ChatTag::Chat => {
                if payload.starts_with(SERVER_ECHO) {
                    return false;
                }
                if !self.suppressed(tag, subject, mentioned_before).await {
                    self.outbox.emit(Outbound::Chat {
                        text: format_chat(&payload),
                    });
                }
            }
            ChatTag::Kick | ChatTag::Ban => {
                if !self.suppressed(tag, subject, mentioned_before).await {
                    let icon = if tag == ChatTag::Kick { "👢" } else { "🔨" };
                    self.outbox.emit(Outbound::Notice {
                        text: format!("{icon} {}", escape_markdown(&payload)),
                    });
                }
            }
            ChatTag::Discord => {
                if self.config.integration_messages && !mentioned_before {
                    self.outbox.emit(Outbound::Chat { text: payload });
                }
            }
            ChatTag::DiscordEmbed => {
                if self.config.integration_messages && !mentioned_before {
                    self.forward_embed(&payload);
                }
            }
        }
        false
    }

    async fn suppressed(&self, tag: ChatTag, subject: Option<&str>, mentioned_before: bool) -> bool {
        if mentioned_before {
            return true;
        }
        match (subject, tag.category()) {
            (Some(account), Some(category)) => self.visibility.suppresses(account, category).await,
            _ => false,
        }
    }

    fn forward_embed(&self, payload: &str) {
        if payload.len() > self.config.limits.max_embed_len {
            warn!("⚠️ Dropped a {} byte embed over the size limit", payload.len());
            return;
        }
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(embed) if embed.is_object() => self.outbox.emit(Outbound::Embed { embed }),
            Ok(_) => warn!("⚠️ Dropped an embed that is not a JSON object"),
            Err(e) => warn!("⚠️ Dropped a malformed embed: {}", e),
        }
    }

    async fn handle_signal(&self, signal: EngineSignal) {
        let templates = &self.config.messages;
        let notice = match &signal {
            EngineSignal::ServerStarted => Some(&templates.server_start),
            EngineSignal::ServerStopped => Some(&templates.server_stop),
            EngineSignal::ConnectionLost => Some(&templates.server_fail),
            EngineSignal::SaveFinished => Some(&templates.server_save),
            EngineSignal::ServerInGame => {
                info!("🎮 Game server is in game");
                None
            }
            EngineSignal::GameId(id) => {
                info!("🆔 Matching server game id: {}", id);
                *self.game_id.write().await = Some(id.clone());
                None
            }
        };
        if let Some(text) = notice.filter(|text| !text.is_empty()) {
            self.outbox.emit(Outbound::Notice { text: text.clone() });
        }

        if let Some(lifecycle) = &self.lifecycle {
            if lifecycle.send(signal).is_err() {
                debug!("Lifecycle listener gone, dropping signal");
            }
        }
    }

    /// Consumes `lines` in order until the stream ends or shutdown.
    pub fn spawn(self: Arc<Self>, mut lines: mpsc::Receiver<String>, shutdown: ShutdownState) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("📜 Log pipeline started");
            loop {
                tokio::select! {
                    line = lines.recv() => match line {
                        Some(line) => self.on_log_line(&line).await,
                        None => break,
                    },
                    _ = shutdown.wait() => break,
                }
            }
            info!("📜 Log pipeline stopped");
        })
    }
}

/// Renders `Name: message` with the name in bold.
fn format_chat(payload: &str) -> String {
    match payload.split_once(':') {
        Some((name, message)) if !name.trim().is_empty() => {
            format!("**{}**:{}", escape_markdown(name.trim()), message)
        }
        _ => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ghost::GhostMode;
    use crate::identity::IdentityLinker;
    use crate::presence::PresenceTracker;
    use crate::spy::{LogCategory, SpyMode};
    use crate::testing::{FakeGame, FixedCodes};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        _dir: TempDir,
        visibility: Arc<VisibilityService>,
        pipeline: LogPipeline,
        events: UnboundedReceiver<Outbound>,
    }

    impl Harness {
        fn drain(&mut self) -> Vec<Outbound> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        /// Events other than console mirroring.
        fn forwarded(&mut self) -> Vec<Outbound> {
            self.drain()
                .into_iter()
                .filter(|e| !matches!(e, Outbound::Console { .. }))
                .collect()
        }
    }

    async fn harness(config: CoreConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let game = Arc::new(FakeGame::running());
        let identity = Arc::new(
            IdentityLinker::open(
                dir.path().join("verification.json"),
                Duration::from_secs(300),
                game.clone(),
                Arc::new(clock.clone()),
                Arc::new(FixedCodes::new(&["123456"])),
            )
            .await,
        );
        identity.create_verification("u1", "Alice").await.unwrap();
        identity.verify("u1", "123456").await.unwrap();

        let (outbox, events) = Outbox::channel();
        let visibility = Arc::new(VisibilityService::new(
            identity,
            PresenceTracker::new(),
            Arc::new(SpyMode::open(dir.path().join("spy_mode.json")).await),
            Arc::new(GhostMode::open(dir.path().join("ghost_mode.json")).await),
            game,
            Arc::new(clock),
            outbox.clone(),
        ));
        let pipeline = LogPipeline::new(Arc::new(config), visibility.clone(), outbox);
        Harness {
            _dir: dir,
            visibility,
            pipeline,
            events,
        }
    }

    #[tokio::test]
    async fn test_chat_and_presence_lines() {
        let mut h = harness(CoreConfig::default()).await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:00 [JOIN] Bob joined the game")
            .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:01 [CHAT] Bob: hello @everyone")
            .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:02 [CHAT] <server>: echo")
            .await;

        assert_eq!(
            h.forwarded(),
            vec![
                Outbound::PlayerJoined {
                    name: "Bob".to_string()
                },
                Outbound::Chat {
                    text: "**Bob**: hello @everyone".to_string()
                },
            ]
        );
        assert!(h.visibility.presence().is_online("Bob").await);
    }

    #[tokio::test]
    async fn test_console_mirror_skips_noise() {
        let mut h = harness(CoreConfig::default()).await;
        h.pipeline.on_log_line("").await;
        h.pipeline
            .on_log_line("Sendto failed (but can be probably ignored)")
            .await;
        h.pipeline.on_log_line("  1.234 Info loading mods").await;

        assert_eq!(
            h.drain(),
            vec![Outbound::Console {
                line: "1.234 Info loading mods".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_hidden_account_lines_are_suppressed() {
        let mut h = harness(CoreConfig::default()).await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:00 [JOIN] Alice joined the game")
            .await;
        h.visibility.activate_ghost("u1").await.unwrap();
        h.drain();

        h.pipeline
            .on_log_line("2025-01-01 00:00:05 [CHAT] Alice: anyone here?")
            .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:06 [CHAT] Bob: Alice is that you")
            .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:09 [LEAVE] Alice left the game")
            .await;
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_spy_category_filters_kick() {
        let mut h = harness(CoreConfig::default()).await;
        h.visibility.spy_add("u1", LogCategory::Kicked).await.unwrap();
        h.pipeline
            .on_log_line("2025-01-01 00:00:00 [KICK] Alice was kicked by admin")
            .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:01 [KICK] Bob was kicked by admin")
            .await;

        assert_eq!(
            h.forwarded(),
            vec![Outbound::Notice {
                text: "👢 Bob was kicked by admin".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_integration_lines_need_flag() {
        let mut h = harness(CoreConfig::default()).await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:00 [DISCORD] Rocket launched")
            .await;
        assert!(h.forwarded().is_empty());

        let mut h = harness(CoreConfig {
            integration_messages: true,
            ..CoreConfig::default()
        })
        .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:00 [DISCORD] Rocket launched")
            .await;
        h.pipeline
            .on_log_line(r#"2025-01-01 00:00:01 [DISCORD-EMBED] {"title":"Research done"}"#)
            .await;
        h.pipeline
            .on_log_line("2025-01-01 00:00:02 [DISCORD-EMBED] {not json")
            .await;

        assert_eq!(
            h.forwarded(),
            vec![
                Outbound::Chat {
                    text: "Rocket launched".to_string()
                },
                Outbound::Embed {
                    embed: serde_json::json!({"title": "Research done"})
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_engine_signals() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut h = harness(CoreConfig::default()).await;
        h.pipeline = h.pipeline.with_lifecycle(tx);

        h.pipeline
            .on_log_line("   2.100 Info ServerMultiplayerManager.cpp:123: Opening socket for broadcast")
            .await;
        h.pipeline
            .on_log_line("  10.000 Info Matching server game `8812345` has been created.")
            .await;

        assert_eq!(
            h.forwarded(),
            vec![Outbound::Notice {
                text: CoreConfig::default().messages.server_start
            }]
        );
        assert_eq!(h.pipeline.game_id().await.as_deref(), Some("8812345"));
        assert_eq!(rx.try_recv().unwrap(), EngineSignal::ServerStarted);
        assert_eq!(rx.try_recv().unwrap(), EngineSignal::GameId("8812345".to_string()));
    }

    #[tokio::test]
    async fn test_passthrough_and_oversized_lines() {
        let mut h = harness(CoreConfig::default()).await;
        h.pipeline.on_log_line("Player Zed doesn't exist.").await;
        let huge = "x".repeat(CoreConfig::default().limits.max_line_len + 1);
        h.pipeline.on_log_line(&huge).await;

        assert_eq!(
            h.forwarded(),
            vec![Outbound::Passthrough {
                line: "Player Zed doesn't exist.".to_string()
            }]
        );
    }
}
