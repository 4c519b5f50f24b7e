//! Assembly of the bridge services and their background tasks.

use crate::classifier::EngineSignal;
use crate::clock::{Clock, SystemClock};
use crate::commands::CommandRouter;
use crate::config::CoreConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::external::{ChatClient, GameProcess};
use crate::forwarder::{ConsoleBatcher, Forwarder, Outbound, Outbox};
use crate::ghost::GhostMode;
use crate::identity::{CodeGenerator, IdentityLinker, OsRngCodes};
use crate::pipeline::LogPipeline;
use crate::presence::PresenceTracker;
use crate::shutdown::ShutdownState;
use crate::spy::SpyMode;
use crate::visibility::VisibilityService;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the bridge talks to but does not own.
pub struct Collaborators {
    pub game: Arc<dyn GameProcess>,
    pub chat: Arc<dyn ChatClient>,
    pub clock: Arc<dyn Clock>,
    pub codes: Arc<dyn CodeGenerator>,
    /// Receives every engine signal seen in the log
    pub lifecycle: Option<mpsc::UnboundedSender<EngineSignal>>,
}

impl Collaborators {
    /// Real clock and OS-backed verification codes.
    pub fn new(game: Arc<dyn GameProcess>, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            game,
            chat,
            clock: Arc::new(SystemClock),
            codes: Arc::new(OsRngCodes),
            lifecycle: None,
        }
    }
}

/// The assembled bridge.
pub struct Bridge {
    config: Arc<CoreConfig>,
    chat: Arc<dyn ChatClient>,
    identity: Arc<IdentityLinker>,
    visibility: Arc<VisibilityService>,
    pipeline: Arc<LogPipeline>,
    commands: CommandRouter,
    events: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
}

impl Bridge {
    /// Loads persisted state and wires the services together. No task is
    /// started until [`Bridge::start`].
    pub async fn open(config: CoreConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let Collaborators {
            game,
            chat,
            clock,
            codes,
            lifecycle,
        } = collaborators;

        let identity = Arc::new(
            IdentityLinker::open(
                &config.storage.links_path,
                config.verification_ttl(),
                game.clone(),
                clock.clone(),
                codes,
            )
            .await,
        );
        let spy = Arc::new(SpyMode::open(&config.storage.spy_path).await);
        let ghost = Arc::new(GhostMode::open(&config.storage.ghost_path).await);

        let (outbox, events) = Outbox::channel();
        let visibility = Arc::new(VisibilityService::new(
            identity.clone(),
            PresenceTracker::new(),
            spy.clone(),
            ghost.clone(),
            game.clone(),
            clock.clone(),
            outbox.clone(),
        ));

        let mut pipeline = LogPipeline::new(config.clone(), visibility.clone(), outbox);
        if let Some(lifecycle) = lifecycle {
            pipeline = pipeline.with_lifecycle(lifecycle);
        }

        let commands = CommandRouter::new(
            config.clone(),
            identity.clone(),
            visibility.clone(),
            spy,
            ghost,
            game,
            clock,
        );

        Self {
            config,
            chat,
            identity,
            visibility,
            pipeline: Arc::new(pipeline),
            commands,
            events: Mutex::new(Some(events)),
        }
    }

    /// Restores hidden accounts and starts the verification sweeper, the
    /// forwarder and, when configured, the console batcher. Can only be
    /// called once.
    pub async fn start(&self, shutdown: &ShutdownState) -> BridgeResult<Vec<JoinHandle<()>>> {
        let events = self.events.lock().await.take().ok_or_else(|| {
            BridgeError::PreconditionFailed("the bridge is already started".to_string())
        })?;

        self.visibility.restore_hidden().await;

        let mut handles = vec![self
            .identity
            .spawn_sweeper(self.config.sweep_interval(), shutdown.clone())];

        let mut forwarder = Forwarder::new(self.chat.clone(), self.config.clone());
        match self.config.console_channel() {
            Some(channel) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let batcher = ConsoleBatcher::new(
                    self.chat.clone(),
                    channel,
                    self.config.console_batch_window(),
                    self.config.limits.max_message_len,
                );
                handles.push(batcher.spawn(rx));
                forwarder = forwarder.with_console(tx);
                info!("🖥️ Mirroring console output to channel {}", channel);
            }
            None => debug!("Console channel disabled"),
        }
        handles.push(forwarder.spawn(events, shutdown.clone()));

        info!("🌉 Bridge started");
        Ok(handles)
    }

    /// Feeds one line of game output through the pipeline.
    pub async fn on_log_line(&self, line: &str) {
        self.pipeline.on_log_line(line).await;
    }

    /// Starts the worker that consumes game output in order.
    pub fn spawn_log_worker(&self, lines: mpsc::Receiver<String>, shutdown: ShutdownState) -> JoinHandle<()> {
        self.pipeline.clone().spawn(lines, shutdown)
    }

    /// Runs a chat command and sends the reply to the user's direct channel.
    pub async fn on_chat_command(&self, chat_id: &str, text: &str) -> String {
        let reply = self.commands.dispatch(chat_id, text).await;
        if !self.chat.send_direct(chat_id, &reply).await {
            warn!("⚠️ Could not deliver a reply to {}", chat_id);
        }
        reply
    }

    pub fn visibility(&self) -> &Arc<VisibilityService> {
        &self.visibility
    }

    pub fn identity(&self) -> &Arc<IdentityLinker> {
        &self.identity
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub async fn game_id(&self) -> Option<String> {
        self.pipeline.game_id().await
    }
}
