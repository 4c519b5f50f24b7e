//! Account commands: `verify`, `confirm`, `unlink`, `status`, `players`.

use super::CommandRouter;
use crate::error::{BridgeError, BridgeResult};
use crate::game_command;
use crate::ghost::GhostState;
use crate::identity::{VerifyOutcome, CODE_LENGTH};
use crate::spy::join_categories;
use crate::utils::{escape_markdown, format_duration};
use tracing::{info, warn};

impl CommandRouter {
    pub(super) async fn verify(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let p = &self.config.command_prefix;
        if args.is_empty() {
            return Err(BridgeError::InvalidInput(format!(
                "Usage: `{p}verify <game_account>`"
            )));
        }
        self.ensure_not_ghosted(chat_id).await?;

        let code = self.identity.create_verification(chat_id, args).await?;
        let account = args.trim();
        let whisper = game_command::verification_whisper(account, &code, p);
        if !self.game.send(&whisper).await {
            warn!("⚠️ Could not deliver verification code to {}", account);
            return Err(BridgeError::UpstreamUnavailable);
        }

        let minutes = self.config.verification_ttl().as_secs() / 60;
        Ok(format!(
            "✅ Verification code sent to **{}** in-game.\n\n\
             The player should see a private message with a {CODE_LENGTH}-digit code.\n\
             Confirm it with: `{p}confirm <code>`\n\n\
             ⏰ The code expires in {minutes} minutes.",
            escape_markdown(account)
        ))
    }

    pub(super) async fn confirm(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let code = args.trim();
        if code.len() != CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(BridgeError::InvalidInput(format!(
                "The verification code must be {CODE_LENGTH} digits."
            )));
        }
        self.ensure_not_ghosted(chat_id).await?;

        match self.visibility.confirm_link(chat_id, code).await? {
            VerifyOutcome::Linked { game_account, saved } => {
                let p = &self.config.command_prefix;
                let mut reply = format!(
                    "✅ Verified! Your account is now linked to game account **{}**.\n\n\
                     You can now use:\n\
                     • `{p}c <command>` - Run commands (visible in game)\n\
                     • `{p}sc <command>` - Run silent commands (hidden from logs)\n\
                     • `{p}spy` - Manage spy mode\n\
                     • `{p}ghost` - Manage ghost mode",
                    escape_markdown(&game_account)
                );
                if !saved {
                    let warning = BridgeError::Persistence(
                        "the link will be lost when the bridge restarts".to_string(),
                    );
                    reply.push_str("\n\n");
                    reply.push_str(&warning.user_message());
                }
                Ok(reply)
            }
            VerifyOutcome::WrongCode => Ok(
                "❌ Invalid verification code. Check it and try again.".to_string(),
            ),
        }
    }

    pub(super) async fn unlink(&self, chat_id: &str) -> BridgeResult<String> {
        self.ensure_not_ghosted(chat_id).await?;
        let account = self.identity.unlink(chat_id).await?;
        Ok(format!(
            "✅ Your account is no longer linked to **{}**.",
            escape_markdown(&account)
        ))
    }

    pub(super) async fn status(&self, chat_id: &str) -> String {
        let admin = if self.config.is_admin(chat_id) { "✅" } else { "❌" };

        let account = self.identity.lookup_game_account(chat_id).await;
        let verification = match (&account, self.identity.pending_for(chat_id).await) {
            (Some(account), _) => format!("✅ Verified as **{}**", escape_markdown(account)),
            (None, Some(pending)) => format!(
                "⏳ Pending for **{}**",
                escape_markdown(&pending.game_account)
            ),
            (None, None) => "❌ Not verified".to_string(),
        };

        let server = if self.game.is_running() {
            "🟢 Running"
        } else {
            "🔴 Stopped"
        };

        let suppressed = self.spy.list(chat_id).await;
        let spy = if suppressed.is_empty() {
            "❌ Inactive".to_string()
        } else {
            format!("✅ Suppressing: {}", join_categories(&suppressed))
        };

        let ghost = match self.ghost.state(chat_id).await {
            GhostState::Inactive => "❌ Inactive",
            GhostState::PreLoginPending => "⏳ Activates on next join",
            GhostState::Active => "👻 Active",
        };

        let mut reply = format!(
            "**Your status:**\n\
             • Admin: {admin}\n\
             • Verification: {verification}\n\
             • Server: {server}\n\
             • Spy mode: {spy}\n\
             • Ghost mode: {ghost}"
        );

        let failures = self.identity.persist_failures()
            + self.spy.persist_failures()
            + self.ghost.persist_failures();
        if failures > 0 {
            reply.push_str(&format!("\n• ⚠️ Failed state writes: {failures}"));
        }
        reply
    }

    pub(super) async fn players(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let include_hidden = match args.to_lowercase().as_str() {
            "" => false,
            "all" if self.config.is_admin(chat_id) => true,
            "all" => {
                return Err(BridgeError::PreconditionFailed(
                    "Only admins can list hidden players.".to_string(),
                ))
            }
            _ => {
                return Err(BridgeError::InvalidInput(format!(
                    "Usage: `{}players [all]`",
                    self.config.command_prefix
                )))
            }
        };

        let entries = if include_hidden {
            info!("👁️ {} listed all players including hidden", chat_id);
            self.visibility.all_players().await
        } else {
            self.visibility.visible_players().await
        };
        if entries.is_empty() {
            return Ok("No players online.".to_string());
        }

        let now = self.clock.now();
        let mut reply = format!("**Online players ({}):**", entries.len());
        for entry in &entries {
            reply.push_str(&format!(
                "\n• {} ({})",
                escape_markdown(&entry.name),
                format_duration(now - entry.joined_at)
            ));
            if entry.hidden {
                reply.push_str(" 👻");
            }
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use std::time::Duration;

    #[tokio::test]
    async fn test_verify_whispers_code() {
        let h = harness().await;
        let reply = h.run("admin", "!verify Alice").await;
        assert!(reply.contains("sent to **Alice**"), "{reply}");
        assert!(reply.contains("5 minutes"), "{reply}");

        let sent = h.game.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Your code: 123456"));
        assert!(sent[0].contains("!confirm 123456"));
    }

    #[tokio::test]
    async fn test_verify_requires_running_game() {
        let h = harness().await;
        h.game.set_running(false);
        assert!(h.run("admin", "!verify Alice").await.contains("not running"));
        assert!(h.run("admin", "!verify").await.contains("Usage"));
    }

    #[tokio::test]
    async fn test_confirm_flow() {
        let h = harness().await;
        assert!(h.run("admin", "!confirm 12345").await.contains("6 digits"));
        assert!(h.run("admin", "!confirm abcdef").await.contains("6 digits"));
        assert!(h.run("admin", "!confirm 123456").await.contains("No pending verification"));

        h.run("admin", "!verify Alice").await;
        assert!(h.run("admin", "!confirm 000000").await.contains("Invalid verification code"));
        assert!(h.run("admin", "!confirm 123456").await.contains("linked to game account **Alice**"));
        assert!(h.run("admin", "!status").await.contains("Verified as **Alice**"));
    }

    #[tokio::test]
    async fn test_confirm_expired_code() {
        let h = harness().await;
        h.run("admin", "!verify Alice").await;
        h.clock.advance(Duration::from_secs(301));
        assert!(h.run("admin", "!confirm 123456").await.contains("expired"));
        assert!(h.run("admin", "!confirm 123456").await.contains("No pending verification"));
    }

    #[tokio::test]
    async fn test_unlink() {
        let h = harness().await;
        assert!(h.run("admin", "!unlink").await.contains("not verified"));
        h.link("admin", "Alice").await;
        assert!(h.run("admin", "!unlink").await.contains("no longer linked to **Alice**"));
    }

    #[tokio::test]
    async fn test_players_listing() {
        let h = harness().await;
        assert_eq!(h.run("guest", "!players").await, "No players online.");

        h.visibility.handle_join("Bob", false).await;
        h.clock.advance(Duration::from_secs(3723));
        assert_eq!(
            h.run("guest", "!players").await,
            "**Online players (1):**\n• Bob (1h 2m 3s)"
        );
        assert!(h.run("guest", "!players all").await.contains("Only admins"));
    }
}
