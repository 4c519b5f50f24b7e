//! Game console commands: `c` runs a visible command, `sc` runs a silent one.

use super::CommandRouter;
use crate::error::{BridgeError, BridgeResult};
use crate::game_command::{self, needs_player_context, parse_player_command, to_script};
use crate::utils::escape_markdown;
use tracing::info;

/// Verbs of the game's own script command; their argument is raw script.
const SCRIPT_VERBS: &[&str] = &["c", "command", "silent-command"];

impl CommandRouter {
    pub(super) async fn open_command(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        if args.is_empty() {
            return Err(BridgeError::InvalidInput(format!(
                "Usage: `{}c <command>`\n\nThis command is visible in the game chat and logs.",
                self.config.command_prefix
            )));
        }
        if self.ghost.is_auto_silent(chat_id, args).await {
            return self.rerouted_command(chat_id, args).await;
        }
        self.ensure_game_running()?;

        let command = game_command::open_command(args);
        if !self.game.send(&command).await {
            return Err(BridgeError::UpstreamUnavailable);
        }
        info!("💻 Open command from {}: {}", chat_id, command);

        let by = match self.identity.lookup_game_account(chat_id).await {
            Some(account) => format!(" as **{}**", escape_markdown(&account)),
            None => String::new(),
        };
        Ok(format!(
            "✅ Command executed{by}: `{command}`\n\n⚠️ This command was visible in the game chat and logs."
        ))
    }

    /// Runs an open command that matched an auto-silent entry silently.
    async fn rerouted_command(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let bare = args.trim().trim_start_matches('/');
        let script = match bare.split_once(char::is_whitespace) {
            Some((verb, script)) if SCRIPT_VERBS.contains(&verb.to_lowercase().as_str()) => {
                script.trim()
            }
            _ => return self.silent_command(chat_id, bare).await,
        };
        self.ensure_game_running()?;
        if !self.game.send(&game_command::silent(script)).await {
            return Err(BridgeError::UpstreamUnavailable);
        }
        info!("🔒 Auto-silent command from {} (content hidden)", chat_id);
        Ok("✅ Command executed silently (auto-silent).\n\n🔒 It was **hidden** from the game chat and logs."
            .to_string())
    }

    pub(super) async fn silent_command(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let p = &self.config.command_prefix;
        if args.is_empty() {
            return Err(BridgeError::InvalidInput(format!(
                "Usage: `{p}sc <command>` or `{p}sc <player>.<command>`\n\n\
                 **Quick commands:** `editor`, `cheat`, `spectator`, `god`, `zoom <value>`, \
                 `speed <value>`, `teleport <x> <y>`, `give <item> [count]`, `research_all`, `chart_all`\n\
                 **Target another player:** `{p}sc PlayerName.editor`\n\
                 **Raw script:** `{p}sc game.speed = 2`"
            )));
        }
        self.ensure_game_running()?;

        let parsed = parse_player_command(args);
        let linked = self.identity.lookup_game_account(chat_id).await;
        if parsed.target.is_none() && linked.is_none() && needs_player_context(&parsed.command) {
            return Err(BridgeError::PreconditionFailed(format!(
                "You must be verified to use player commands. Use `{p}verify <game_account>` first, \
                 or name a player: `{p}sc PlayerName.{}`",
                parsed.command
            )));
        }

        let player = parsed.target.as_deref().or(linked.as_deref());
        let script = to_script(&parsed.command, player);
        if !self.game.send(&game_command::silent(&script)).await {
            return Err(BridgeError::UpstreamUnavailable);
        }
        info!("🔒 Silent command from {} (content hidden)", chat_id);

        let head = match (&parsed.target, &linked) {
            (Some(target), _) => format!(
                "✅ Silent command executed on **{}**: `{}`",
                escape_markdown(target),
                parsed.command
            ),
            (None, Some(account)) => format!(
                "✅ Silent command executed as **{}**: `{}`",
                escape_markdown(account),
                parsed.command
            ),
            (None, None) => format!("✅ Silent command executed: `{}`", parsed.command),
        };
        Ok(format!(
            "{head}\n\n🔒 This command was **hidden** from the game chat and logs."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;

    #[tokio::test]
    async fn test_open_command() {
        let h = harness().await;
        let reply = h.run("admin", "!c kick Bob").await;
        assert!(reply.contains("`/kick Bob`"), "{reply}");
        assert_eq!(h.game.sent(), vec!["/kick Bob".to_string()]);

        h.game.set_running(false);
        assert!(h.run("admin", "!c kick Bob").await.contains("not running"));
        assert!(h.run("admin", "!c").await.contains("Usage"));
    }

    #[tokio::test]
    async fn test_silent_command_targets() {
        let h = harness().await;
        assert!(h.run("admin", "!sc editor").await.contains("must be verified"));

        let reply = h.run("admin", "!sc Shadow.editor").await;
        assert!(reply.contains("on **Shadow**"), "{reply}");
        h.run("admin", "!sc game.speed = 2").await;

        h.link("admin", "Alice").await;
        let reply = h.run("admin", "!sc god").await;
        assert!(reply.contains("as **Alice**"), "{reply}");

        let sent = h.game.sent();
        assert_eq!(
            sent[0],
            "/silent-command local p = game.get_player(\"Shadow\"); if p then p.toggle_map_editor() end"
        );
        assert_eq!(sent[1], "/silent-command game.speed = 2");
        assert!(sent.last().unwrap().contains("game.get_player(\"Alice\")"));
    }

    #[tokio::test]
    async fn test_auto_silent_reroute() {
        let h = harness().await;
        h.link("admin", "Alice").await;
        h.run("admin", "!ghost commands add c").await;
        h.run("admin", "!ghost commands add editor").await;

        h.run("admin", "!c /c game.speed = 3").await;
        h.run("admin", "!c editor").await;
        h.run("admin", "!c kick Bob").await;

        let sent = h.game.sent();
        let tail = &sent[sent.len() - 3..];
        assert_eq!(tail[0], "/silent-command game.speed = 3");
        assert_eq!(
            tail[1],
            "/silent-command local p = game.get_player(\"Alice\"); if p then p.toggle_map_editor() end"
        );
        assert_eq!(tail[2], "/kick Bob");
    }
}
