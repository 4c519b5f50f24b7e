//! Ghost and spy transitions, and presence handling for JOIN/LEAVE events.
//!
//! Every operation here that touches more than one of presence, spy mode
//! and ghost mode runs under a single transition lock, so a ghost toggle and
//! a JOIN line for the same account can never interleave. Synthesized events
//! go into the [`Outbox`] while the lock is held, which keeps them in order
//! with the real ones. Commands for the game process are collected and sent
//! after the lock is released.

use crate::clock::Clock;
use crate::error::{BridgeError, BridgeResult};
use crate::external::GameProcess;
use crate::forwarder::{Outbound, Outbox};
use crate::game_command;
use crate::ghost::{GhostMode, GhostState};
use crate::identity::{IdentityLinker, VerifyOutcome};
use crate::presence::{PresenceEntry, PresenceTracker};
use crate::spy::{LogCategory, SpyMode};
use crate::utils::{escape_markdown, format_duration, format_play_time};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a ghost mode command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GhostOutcome {
    /// Ghost mode turned on immediately; a fake leave with `play_time` was sent
    Activated { play_time: String },
    /// Ghost mode will turn on at the next join
    Armed,
    AlreadyActive,
    AlreadyPending,
    /// Ghost mode turned off after a session of `session`. `announced` is
    /// false when the account was offline and no fake join was sent.
    Deactivated { session: String, announced: bool },
    /// A pending pre-login activation was cancelled
    PendingCancelled,
    NotActive,
}

/// Coordinates presence, spy mode and ghost mode.
#[derive(Debug)]
pub struct VisibilityService {
    identity: Arc<IdentityLinker>,
    presence: PresenceTracker,
    spy: Arc<SpyMode>,
    ghost: Arc<GhostMode>,
    game: Arc<dyn GameProcess>,
    clock: Arc<dyn Clock>,
    outbox: Outbox,
    transitions: Mutex<()>,
}

impl VisibilityService {
    pub fn new(
        identity: Arc<IdentityLinker>,
        presence: PresenceTracker,
        spy: Arc<SpyMode>,
        ghost: Arc<GhostMode>,
        game: Arc<dyn GameProcess>,
        clock: Arc<dyn Clock>,
        outbox: Outbox,
    ) -> Self {
        Self {
            identity,
            presence,
            spy,
            ghost,
            game,
            clock,
            outbox,
            transitions: Mutex::new(()),
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Re-hides the game accounts of every chat account whose ghost mode was
    /// left enabled by a previous run.
    pub async fn restore_hidden(&self) -> usize {
        let _guard = self.transitions.lock().await;
        let mut restored = 0;
        for chat_id in self.ghost.enabled_accounts().await {
            if let Some(account) = self.identity.lookup_game_account(&chat_id).await {
                self.presence.hide(&account).await;
                restored += 1;
            }
        }
        if restored > 0 {
            info!("👻 Restored {} hidden accounts from ghost mode", restored);
        }
        restored
    }

    async fn linked_account(&self, chat_id: &str) -> BridgeResult<String> {
        self.identity
            .lookup_game_account(chat_id)
            .await
            .ok_or(BridgeError::NotLinked)
    }

    /// Turns ghost mode on for an online account: fake leave, hide, and
    /// force spy mode to suppress everything.
    pub async fn activate_ghost(&self, chat_id: &str) -> BridgeResult<GhostOutcome> {
        let account = self.linked_account(chat_id).await?;

        let (outcome, commands) = {
            let _guard = self.transitions.lock().await;
            match self.ghost.state(chat_id).await {
                GhostState::Active => return Ok(GhostOutcome::AlreadyActive),
                GhostState::PreLoginPending => return Ok(GhostOutcome::AlreadyPending),
                GhostState::Inactive => {}
            }

            let joined_at = self
                .presence
                .join_time(&account)
                .await
                .ok_or_else(|| BridgeError::NotOnline(account.clone()))?;
            let now = self.clock.now();
            let play_time = format_play_time(now - joined_at);

            let saved = self.spy.list(chat_id).await;
            self.ghost.set_active(chat_id, Some(saved), now).await;
            self.outbox.emit(Outbound::PlayerLeft {
                name: account.clone(),
                play_time: Some(play_time.clone()),
            });
            self.presence.hide(&account).await;
            let forced = self.spy.add(chat_id, LogCategory::All).await;

            let mut commands = vec![game_command::ghost_hide(&account)];
            commands.extend(game_command::spy_store(&account, &forced));
            (GhostOutcome::Activated { play_time }, commands)
        };

        info!("👻 Ghost mode activated for {} ({})", chat_id, account);
        self.send_to_game(&commands).await;
        Ok(outcome)
    }

    /// Arms ghost mode to activate at the next join of the linked account.
    pub async fn arm_pre_login(&self, chat_id: &str) -> BridgeResult<GhostOutcome> {
        let account = self.linked_account(chat_id).await?;

        let _guard = self.transitions.lock().await;
        match self.ghost.state(chat_id).await {
            GhostState::Active => Ok(GhostOutcome::AlreadyActive),
            GhostState::PreLoginPending => Ok(GhostOutcome::AlreadyPending),
            GhostState::Inactive => {
                let saved = self.spy.list(chat_id).await;
                self.ghost.set_pre_login(chat_id, saved).await;
                info!("⏳ Pre-login ghost mode armed for {} ({})", chat_id, account);
                Ok(GhostOutcome::Armed)
            }
        }
    }

    /// Turns ghost mode off, or cancels a pending pre-login activation.
    ///
    /// An enabled config whose link has since disappeared is still cleared:
    /// the saved spy set comes back, but no fake join is sent.
    pub async fn deactivate_ghost(&self, chat_id: &str) -> BridgeResult<GhostOutcome> {
        let linked = self.identity.lookup_game_account(chat_id).await;

        let (outcome, commands) = {
            let _guard = self.transitions.lock().await;
            let Some(previous) = self.ghost.deactivate(chat_id).await else {
                return match linked {
                    Some(_) => Ok(GhostOutcome::NotActive),
                    None => Err(BridgeError::NotLinked),
                };
            };
            if !previous.enabled {
                info!("⏳ Pre-login ghost mode cancelled for {}", chat_id);
                return Ok(GhostOutcome::PendingCancelled);
            }

            let now = self.clock.now();
            let session = format_play_time(now - previous.fake_join_time.unwrap_or(now));

            let restored = previous.previous_spy_mode;
            self.spy.replace(chat_id, restored.clone()).await;

            let Some(account) = linked.as_deref() else {
                warn!("👁️ Ghost mode cleared for {} after its link was removed", chat_id);
                return Ok(GhostOutcome::Deactivated {
                    session,
                    announced: false,
                });
            };
            self.presence.unhide(account).await;

            let online = self.presence.is_online(account).await;
            let mut commands = Vec::new();
            if online {
                self.outbox.emit(Outbound::PlayerJoined {
                    name: account.to_string(),
                });
                self.presence.join(account, now).await;
                commands.push(game_command::ghost_reveal(account));
            } else {
                debug!("{} is offline, skipping fake join", account);
            }
            commands.push(match game_command::spy_store(account, &restored) {
                Some(store) => store,
                None => game_command::spy_clear(account),
            });

            (
                GhostOutcome::Deactivated {
                    session,
                    announced: online,
                },
                commands,
            )
        };

        info!("👁️ Ghost mode deactivated for {} ({})", chat_id, linked.unwrap_or_default());
        self.send_to_game(&commands).await;
        Ok(outcome)
    }

    /// Confirms the pending verification of `chat_id`.
    ///
    /// Refused while the requested game account is linked to another chat
    /// account whose ghost mode is on or pending.
    pub async fn confirm_link(&self, chat_id: &str, code: &str) -> BridgeResult<VerifyOutcome> {
        let _guard = self.transitions.lock().await;
        if let Some(request) = self.identity.pending_for(chat_id).await {
            if request.code == code.trim() {
                let owner = self.identity.lookup_chat_account(&request.game_account).await;
                if let Some(owner) = owner.filter(|owner| owner != chat_id) {
                    if self.ghost.state(&owner).await != GhostState::Inactive {
                        info!(
                            "🚫 Refused to relink {} to {} while its owner is in ghost mode",
                            request.game_account, chat_id
                        );
                        return Err(BridgeError::PreconditionFailed(format!(
                            "**{}** is linked to another account that is in ghost mode. \
                             It can be relinked once ghost mode is turned off.",
                            escape_markdown(&request.game_account)
                        )));
                    }
                }
            }
        }
        self.identity.verify(chat_id, code).await
    }

    /// Processes a JOIN for `account`. The presence table is always updated;
    /// the notice is emitted only when nothing suppresses it.
    ///
    /// `mentions_hidden` tells whether the raw line named a hidden account
    /// when it arrived.
    pub async fn handle_join(&self, account: &str, mentions_hidden: bool) {
        let commands = {
            let _guard = self.transitions.lock().await;
            let now = self.clock.now();
            self.presence.join(account, now).await;

            let chat_id = self.identity.lookup_chat_account(account).await;
            let ghost_state = match &chat_id {
                Some(chat_id) => self.ghost.state(chat_id).await,
                None => GhostState::Inactive,
            };

            match (chat_id, ghost_state) {
                (Some(chat_id), GhostState::PreLoginPending) => {
                    self.ghost.set_active(&chat_id, None, now).await;
                    self.presence.hide(account).await;
                    let forced = self.spy.add(&chat_id, LogCategory::All).await;
                    info!("👻 {} joined in ghost mode", account);

                    let mut commands = vec![game_command::ghost_hide(account)];
                    commands.extend(game_command::spy_store(account, &forced));
                    commands
                }
                (Some(_), GhostState::Active) => {
                    self.presence.hide(account).await;
                    debug!("{} rejoined while ghosted", account);
                    vec![game_command::ghost_hide(account)]
                }
                (chat_id, _) => {
                    let suppressed = mentions_hidden
                        || self.presence.is_hidden(account).await
                        || self.spy_suppresses(chat_id.as_deref(), LogCategory::Join).await;
                    if suppressed {
                        debug!("Join of {} suppressed", account);
                    } else {
                        self.outbox.emit(Outbound::PlayerJoined {
                            name: account.to_string(),
                        });
                    }
                    Vec::new()
                }
            }
        };
        self.send_to_game(&commands).await;
    }

    /// Processes a LEAVE for `account`. Returns whether the account was
    /// hidden, in which case nothing about the leave may be forwarded.
    pub async fn handle_leave(&self, account: &str, mentions_hidden: bool) -> bool {
        let _guard = self.transitions.lock().await;
        let now = self.clock.now();
        let elapsed = self.presence.leave(account, now).await;
        let was_hidden = self.presence.unhide(account).await;

        if was_hidden {
            debug!("{} left while hidden", account);
            return true;
        }

        let chat_id = self.identity.lookup_chat_account(account).await;
        if mentions_hidden || self.spy_suppresses(chat_id.as_deref(), LogCategory::Leave).await {
            debug!("Leave of {} suppressed", account);
            return false;
        }

        self.outbox.emit(Outbound::PlayerLeft {
            name: account.to_string(),
            play_time: elapsed.map(format_duration),
        });
        false
    }

    /// Whether a `category` event about `account` is dropped by spy mode.
    pub async fn suppresses(&self, account: &str, category: LogCategory) -> bool {
        let chat_id = self.identity.lookup_chat_account(account).await;
        self.spy_suppresses(chat_id.as_deref(), category).await
    }

    async fn spy_suppresses(&self, chat_id: Option<&str>, category: LogCategory) -> bool {
        match chat_id {
            Some(chat_id) => self.spy.suppresses(chat_id, category).await,
            None => false,
        }
    }

    /// Spy mode edits. Refused while ghost mode owns the spy configuration.
    pub async fn spy_add(&self, chat_id: &str, category: LogCategory) -> BridgeResult<Vec<LogCategory>> {
        let account = self.linked_account(chat_id).await?;
        let list = {
            let _guard = self.transitions.lock().await;
            self.ensure_spy_editable(chat_id).await?;
            self.spy.add(chat_id, category).await
        };
        self.sync_spy(&account, &list).await;
        Ok(list)
    }

    pub async fn spy_remove(&self, chat_id: &str, category: LogCategory) -> BridgeResult<Vec<LogCategory>> {
        let account = self.linked_account(chat_id).await?;
        let list = {
            let _guard = self.transitions.lock().await;
            self.ensure_spy_editable(chat_id).await?;
            self.spy.remove(chat_id, category).await
        };
        self.sync_spy(&account, &list).await;
        Ok(list)
    }

    pub async fn spy_clear(&self, chat_id: &str) -> BridgeResult<()> {
        let account = self.linked_account(chat_id).await?;
        {
            let _guard = self.transitions.lock().await;
            self.ensure_spy_editable(chat_id).await?;
            self.spy.clear(chat_id).await;
        }
        self.sync_spy(&account, &[]).await;
        Ok(())
    }

    async fn ensure_spy_editable(&self, chat_id: &str) -> BridgeResult<()> {
        if self.ghost.state(chat_id).await == GhostState::Active {
            return Err(BridgeError::PreconditionFailed(
                "spy mode is managed by ghost mode while it is active".to_string(),
            ));
        }
        Ok(())
    }

    async fn sync_spy(&self, account: &str, list: &[LogCategory]) {
        let command = match game_command::spy_store(account, list) {
            Some(store) => store,
            None => game_command::spy_clear(account),
        };
        self.send_to_game(&[command]).await;
    }

    pub async fn visible_players(&self) -> Vec<PresenceEntry> {
        self.presence.visible().await
    }

    pub async fn all_players(&self) -> Vec<PresenceEntry> {
        self.presence.all().await
    }

    async fn send_to_game(&self, commands: &[String]) {
        if commands.is_empty() {
            return;
        }
        if !self.game.is_running() {
            debug!("Game not running, skipping {} state commands", commands.len());
            return;
        }
        for command in commands {
            if !self.game.send(command).await {
                warn!("⚠️ Failed to deliver a state command to the game");
            }
        }
    }
}
