//! Chat command layer.
//!
//! Messages that start with the configured prefix are parsed into a verb and
//! its arguments and dispatched to the handlers in the submodules. Every
//! handler returns a [`BridgeResult`]; errors are turned into replies here,
//! so nothing a user types can fail the bridge.

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::external::GameProcess;
use crate::ghost::{GhostMode, GhostState};
use crate::identity::IdentityLinker;
use crate::spy::SpyMode;
use crate::visibility::VisibilityService;
use std::sync::Arc;
use tracing::debug;

mod account;
mod console;
mod modes;

/// Verbs only admins may run.
const ADMIN_VERBS: &[&str] = &["verify", "spy", "ghost", "c", "sc"];

/// Dispatches chat commands to the bridge services.
#[derive(Debug)]
pub struct CommandRouter {
    config: Arc<CoreConfig>,
    identity: Arc<IdentityLinker>,
    visibility: Arc<VisibilityService>,
    spy: Arc<SpyMode>,
    ghost: Arc<GhostMode>,
    game: Arc<dyn GameProcess>,
    clock: Arc<dyn Clock>,
}

impl CommandRouter {
    pub fn new(
        config: Arc<CoreConfig>,
        identity: Arc<IdentityLinker>,
        visibility: Arc<VisibilityService>,
        spy: Arc<SpyMode>,
        ghost: Arc<GhostMode>,
        game: Arc<dyn GameProcess>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            identity,
            visibility,
            spy,
            ghost,
            game,
            clock,
        }
    }

    /// Handles one message from `chat_id` and returns the reply.
    pub async fn dispatch(&self, chat_id: &str, text: &str) -> String {
        let is_admin = self.config.is_admin(chat_id);
        let text = text.trim();

        let Some(input) = text.strip_prefix(self.config.command_prefix.as_str()) else {
            return if is_admin {
                self.help()
            } else {
                "❌ You are not authorized to use commands. Only configured admins can use this bridge."
                    .to_string()
            };
        };

        let (verb, args) = split_verb(input);
        debug!("Command `{}` from {}", verb, chat_id);

        if ADMIN_VERBS.contains(&verb.as_str()) && !is_admin {
            return format!("❌ Only admins can use the `{verb}` command.");
        }

        let result = match verb.as_str() {
            "verify" => self.verify(chat_id, args).await,
            "confirm" => self.confirm(chat_id, args).await,
            "unlink" => self.unlink(chat_id).await,
            "status" => Ok(self.status(chat_id).await),
            "players" => self.players(chat_id, args).await,
            "spy" => self.spy(chat_id, args).await,
            "ghost" => self.ghost(chat_id, args).await,
            "c" => self.open_command(chat_id, args).await,
            "sc" => self.silent_command(chat_id, args).await,
            "help" => Ok(self.help()),
            _ => Err(BridgeError::InvalidInput(format!(
                "Unknown command. Use `{}help` for available commands.",
                self.config.command_prefix
            ))),
        };

        result.unwrap_or_else(|e| e.user_message())
    }

    fn help(&self) -> String {
        let p = &self.config.command_prefix;
        format!(
            "**Ghostwire commands**\n\n\
             **Account**\n\
             `{p}verify <player>` - Link with a game account\n\
             `{p}confirm <code>` - Confirm the code shown in-game\n\
             `{p}unlink` - Remove the link\n\
             `{p}status` - Show your status\n\
             `{p}players [all]` - List online players\n\n\
             **Console**\n\
             `{p}c <cmd>` - Run a command (**visible**)\n\
             `{p}sc <cmd>` - Run a silent command (**hidden**)\n\
             `{p}sc Player.cmd` - Run on a specific player\n\n\
             **Spy mode**\n\
             `{p}spy on` - Hide all your actions from the logs\n\
             `{p}spy off` - Show your actions again\n\
             `{p}spy add <TYPE>` - Hide one log type\n\
             `{p}spy list` - Show the log types\n\n\
             **Ghost mode**\n\
             `{p}ghost on` - Become invisible\n\
             `{p}ghost off` - Become visible again\n\
             `{p}ghost prelogin` - Become invisible on your next join\n\
             `{p}ghost commands` - Manage auto-silent commands"
        )
    }

    /// Refuses identity changes while ghost mode depends on the current link.
    async fn ensure_not_ghosted(&self, chat_id: &str) -> BridgeResult<()> {
        if self.ghost.state(chat_id).await != GhostState::Inactive {
            return Err(BridgeError::PreconditionFailed(
                "Turn ghost mode off before changing your link.".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_game_running(&self) -> BridgeResult<()> {
        if !self.game.is_running() {
            return Err(BridgeError::UpstreamUnavailable);
        }
        Ok(())
    }
}

/// Splits `verb rest...` into a lowercase verb and the trimmed remainder.
fn split_verb(input: &str) -> (String, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((verb, args)) => (verb.to_lowercase(), args.trim()),
        None => (input.to_lowercase(), ""),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::forwarder::{Outbound, Outbox};
    use crate::presence::PresenceTracker;
    use crate::testing::{FakeGame, FixedCodes};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub struct Harness {
        pub _dir: TempDir,
        pub clock: ManualClock,
        pub game: Arc<FakeGame>,
        pub visibility: Arc<VisibilityService>,
        pub router: CommandRouter,
        pub events: UnboundedReceiver<Outbound>,
    }

    impl Harness {
        pub async fn run(&self, chat_id: &str, text: &str) -> String {
            self.router.dispatch(chat_id, text).await
        }

        /// Links `chat_id` to `account` through the verify/confirm flow.
        pub async fn link(&self, chat_id: &str, account: &str) {
            self.run(chat_id, &format!("!verify {account}")).await;
            let reply = self.run(chat_id, "!confirm 123456").await;
            assert!(reply.starts_with("✅"), "{reply}");
        }
    }

    /// A router where `admin` is the only admin.
    pub async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        let game = Arc::new(FakeGame::running());
        let config = Arc::new(CoreConfig {
            admin_ids: vec!["admin".to_string()],
            ..CoreConfig::default()
        });
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
        let spy = Arc::new(SpyMode::open(dir.path().join("spy_mode.json")).await);
        let ghost = Arc::new(GhostMode::open(dir.path().join("ghost_mode.json")).await);
        let (outbox, events) = Outbox::channel();
        let visibility = Arc::new(VisibilityService::new(
            identity.clone(),
            PresenceTracker::new(),
            spy.clone(),
            ghost.clone(),
            game.clone(),
            Arc::new(clock.clone()),
            outbox,
        ));
        let router = CommandRouter::new(
            config,
            identity,
            visibility.clone(),
            spy,
            ghost,
            game.clone(),
            Arc::new(clock.clone()),
        );
        Harness {
            _dir: dir,
            clock,
            game,
            visibility,
            router,
            events,
        }
    }
}
