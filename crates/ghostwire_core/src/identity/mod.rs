//! Identity linking between chat accounts and game accounts.
//!
//! A chat account proves it controls a game account by relaying a one-time
//! code that was whispered to that game account in-game. Successful
//! verification installs a 1:1 link; relinking either side breaks the old
//! link on both ends. Links are persisted, pending codes are not.

use crate::clock::Clock;
use crate::error::{BridgeError, BridgeResult};
use crate::external::GameProcess;
use crate::shutdown::ShutdownState;
use crate::store::Persisted;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod codes;
pub mod links;

pub use codes::{CodeGenerator, OsRngCodes, PendingVerification, CODE_LENGTH};
pub use links::LinkTable;

/// Result of a well-formed verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The code matched and the link was installed. `saved` is false when
    /// the link could not be written to disk.
    Linked { game_account: String, saved: bool },
    /// The code did not match; the pending request is kept for another try.
    WrongCode,
}

/// Owns the link table and the pending verification requests.
#[derive(Debug)]
pub struct IdentityLinker {
    links: Persisted<LinkTable>,
    pending: Arc<RwLock<HashMap<String, PendingVerification>>>,
    game: Arc<dyn GameProcess>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    ttl: chrono::Duration,
}

impl IdentityLinker {
    pub async fn open(
        path: impl Into<PathBuf>,
        ttl: Duration,
        game: Arc<dyn GameProcess>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
    ) -> Self {
        let links = Persisted::open(path).await;
        let count = links.read(|table: &LinkTable| table.discord_to_game.len()).await;
        info!("🔗 Loaded {} account links from {}", count, links.path().display());
        Self {
            links,
            pending: Arc::new(RwLock::new(HashMap::new())),
            game,
            clock,
            codes,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Issues a fresh code for linking `chat_id` to `game_account`,
    /// replacing any request `chat_id` already had pending.
    pub async fn create_verification(&self, chat_id: &str, game_account: &str) -> BridgeResult<String> {
        let game_account = game_account.trim();
        if game_account.is_empty() || game_account.contains(char::is_whitespace) {
            return Err(BridgeError::InvalidInput(
                "a single game account name is required".to_string(),
            ));
        }
        if !self.game.is_running() {
            return Err(BridgeError::UpstreamUnavailable);
        }

        let code = self.codes.generate();
        let request = PendingVerification {
            chat_id: chat_id.to_string(),
            game_account: game_account.to_string(),
            code: code.clone(),
            expires_at: self.clock.now() + self.ttl,
        };

        let replaced = self
            .pending
            .write()
            .await
            .insert(chat_id.to_string(), request)
            .is_some();
        if replaced {
            debug!("Replaced pending verification for {}", chat_id);
        }
        info!("🔐 Verification requested: {} -> {}", chat_id, game_account);
        Ok(code)
    }

    /// Checks `code` against the pending request of `chat_id`.
    pub async fn verify(&self, chat_id: &str, code: &str) -> BridgeResult<VerifyOutcome> {
        let game_account = {
            let mut pending = self.pending.write().await;
            let request = pending
                .get(chat_id)
                .ok_or_else(|| BridgeError::NotFound("pending verification".to_string()))?;

            if request.is_expired(self.clock.now()) {
                pending.remove(chat_id);
                return Err(BridgeError::Expired);
            }
            if request.code != code.trim() {
                return Ok(VerifyOutcome::WrongCode);
            }
            match pending.remove(chat_id) {
                Some(request) => request.game_account,
                None => return Err(BridgeError::NotFound("pending verification".to_string())),
            }
        };

        let ((), saved) = self
            .links
            .update(|table| table.link(chat_id, &game_account))
            .await;
        info!("✅ Linked {} to game account {}", chat_id, game_account);
        Ok(VerifyOutcome::Linked { game_account, saved })
    }

    /// Removes the link of `chat_id`. Returns the game account it pointed to.
    pub async fn unlink(&self, chat_id: &str) -> BridgeResult<String> {
        let (game_account, _) = self
            .links
            .try_update(|table| table.unlink(chat_id).ok_or(BridgeError::NotLinked))
            .await?;
        info!("🔓 Unlinked {} from game account {}", chat_id, game_account);
        Ok(game_account)
    }

    pub async fn lookup_game_account(&self, chat_id: &str) -> Option<String> {
        self.links
            .read(|table| table.discord_to_game.get(chat_id).cloned())
            .await
    }

    pub async fn lookup_chat_account(&self, game_account: &str) -> Option<String> {
        self.links
            .read(|table| table.game_to_discord.get(game_account).cloned())
            .await
    }

    /// The unexpired pending request of `chat_id`, if any.
    pub async fn pending_for(&self, chat_id: &str) -> Option<PendingVerification> {
        let now = self.clock.now();
        self.pending
            .read()
            .await
            .get(chat_id)
            .filter(|request| !request.is_expired(now))
            .cloned()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Deletes every expired pending request. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, request| !request.is_expired(now));
        before - pending.len()
    }

    /// Runs [`IdentityLinker::sweep_expired`] every `interval` until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, shutdown: ShutdownState) -> JoinHandle<()> {
        let linker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {
                        let removed = linker.sweep_expired().await;
                        if removed > 0 {
                            debug!("🧹 Swept {} expired verification requests", removed);
                        }
                    }
                }
            }
            debug!("Verification sweeper stopped");
        })
    }

    pub fn persist_failures(&self) -> u64 {
        self.links.failures()
    }
}
