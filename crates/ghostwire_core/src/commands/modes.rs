//! `spy` and `ghost` commands.

use super::CommandRouter;
use crate::error::{BridgeError, BridgeResult};
use crate::ghost::GhostState;
use crate::spy::{join_categories, LogCategory};
use crate::visibility::GhostOutcome;

impl CommandRouter {
    pub(super) async fn spy(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let p = &self.config.command_prefix;
        let mut parts = args.split_whitespace();
        let action = parts.next().map(str::to_lowercase);
        let argument = parts.next();

        if self.identity.lookup_game_account(chat_id).await.is_none() {
            return Err(BridgeError::PreconditionFailed(format!(
                "You must be verified to use spy mode. Use `{p}verify <game_account>` first."
            )));
        }

        match action.as_deref() {
            None => {
                let current = self.spy.list(chat_id).await;
                let current = if current.is_empty() {
                    "None".to_string()
                } else {
                    join_categories(&current)
                };
                Ok(format!(
                    "**🕵️ Spy mode - log suppression**\n\n\
                     **Currently suppressed:** {current}\n\n\
                     **Usage:**\n\
                     • `{p}spy add <LOG_TYPE>` - Suppress a log type\n\
                     • `{p}spy remove <LOG_TYPE>` - Stop suppressing a log type\n\
                     • `{p}spy clear` - Clear all suppressions\n\
                     • `{p}spy list` - Show available log types\n\
                     • `{p}spy on` - Suppress ALL logs\n\
                     • `{p}spy off` - Disable spy mode"
                ))
            }
            Some("list") => {
                let names = LogCategory::VARIANTS
                    .iter()
                    .filter(|c| **c != LogCategory::All)
                    .map(LogCategory::as_str)
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(format!(
                    "**Available log types:**\n```\n{names}\n```\nUse `ALL` to suppress every type at once."
                ))
            }
            Some("add") => {
                let category = parse_category(argument, "add", p)?;
                self.visibility.spy_add(chat_id, category).await?;
                Ok(format!("✅ Now suppressing **{category}** logs for your player."))
            }
            Some("remove") => {
                let category = parse_category(argument, "remove", p)?;
                self.visibility.spy_remove(chat_id, category).await?;
                Ok(format!("✅ Stopped suppressing **{category}** logs."))
            }
            Some("clear") | Some("off") => {
                self.visibility.spy_clear(chat_id).await?;
                Ok("✅ Spy mode deactivated. All logs are visible again.".to_string())
            }
            Some("on") => {
                self.visibility.spy_add(chat_id, LogCategory::All).await?;
                Ok(format!(
                    "✅ Spy mode **fully activated**. All your actions are hidden from the logs.\n\n\
                     ⚠️ Use `{p}spy off` to deactivate."
                ))
            }
            Some(_) => Err(BridgeError::InvalidInput(format!(
                "Unknown spy command. Use `{p}spy` for help."
            ))),
        }
    }

    pub(super) async fn ghost(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let p = &self.config.command_prefix;
        let (action, rest) = match args.split_once(char::is_whitespace) {
            Some((action, rest)) => (action.to_lowercase(), rest.trim()),
            None => (args.to_lowercase(), ""),
        };

        match action.as_str() {
            "" => {
                let state = match self.ghost.state(chat_id).await {
                    GhostState::Inactive => "❌ Inactive",
                    GhostState::PreLoginPending => "⏳ Activates on your next join",
                    GhostState::Active => "👻 Active",
                };
                Ok(format!(
                    "**👻 Ghost mode:** {state}\n\n\
                     **Usage:**\n\
                     • `{p}ghost on` - Become invisible now (you must be online)\n\
                     • `{p}ghost prelogin` - Become invisible on your next join\n\
                     • `{p}ghost off` - Become visible again\n\
                     • `{p}ghost commands` - Manage auto-silent commands"
                ))
            }
            "on" => match self.visibility.activate_ghost(chat_id).await? {
                GhostOutcome::Activated { play_time } => Ok(format!(
                    "👻 Ghost mode **activated**. A fake leave was announced after {play_time} of play.\n\n\
                     You are hidden from the player list and all your logs are suppressed."
                )),
                outcome => Ok(describe(outcome)),
            },
            "prelogin" | "pre-login" => match self.visibility.arm_pre_login(chat_id).await? {
                GhostOutcome::Armed => Ok(
                    "⏳ Ghost mode will activate when you next join. Your join will not be announced."
                        .to_string(),
                ),
                outcome => Ok(describe(outcome)),
            },
            "off" => match self.visibility.deactivate_ghost(chat_id).await? {
                GhostOutcome::Deactivated { session, announced } => {
                    let mut reply = format!("👁️ Ghost mode **deactivated** after {session}.");
                    if announced {
                        reply.push_str(" A fake join was announced.");
                    }
                    Ok(reply)
                }
                outcome => Ok(describe(outcome)),
            },
            "commands" | "cmds" => self.ghost_commands(chat_id, rest).await,
            _ => Err(BridgeError::InvalidInput(format!(
                "Unknown ghost command. Use `{p}ghost` for help."
            ))),
        }
    }

    async fn ghost_commands(&self, chat_id: &str, args: &str) -> BridgeResult<String> {
        let p = &self.config.command_prefix;
        let (action, rest) = match args.split_once(char::is_whitespace) {
            Some((action, rest)) => (action.to_lowercase(), rest.trim()),
            None => (args.to_lowercase(), ""),
        };

        match action.as_str() {
            "" | "list" => {
                let commands = self.ghost.auto_silent_commands(chat_id).await;
                if commands.is_empty() {
                    return Ok(format!(
                        "No auto-silent commands. Add one with `{p}ghost commands add <cmd>`."
                    ));
                }
                let mut reply = "**⚡ Auto-silent commands:**".to_string();
                for (i, command) in commands.iter().enumerate() {
                    reply.push_str(&format!("\n{}. `{}`", i + 1, command));
                }
                Ok(reply)
            }
            "add" => {
                if self.ghost.add_auto_silent(chat_id, rest).await? {
                    Ok(format!("✅ `{rest}` will now run silently."))
                } else {
                    Ok(format!("ℹ️ `{rest}` is already auto-silent."))
                }
            }
            "remove" => {
                let position = rest.parse::<usize>().map_err(|_| {
                    BridgeError::InvalidInput(format!("Usage: `{p}ghost commands remove <number>`"))
                })?;
                let removed = self.ghost.remove_auto_silent_at(chat_id, position).await?;
                Ok(format!("✅ Removed `{removed}` from auto-silent commands."))
            }
            "clear" => {
                self.ghost.clear_auto_silent(chat_id).await;
                Ok("✅ Auto-silent commands cleared.".to_string())
            }
            _ => Err(BridgeError::InvalidInput(format!(
                "Usage: `{p}ghost commands [add <cmd>|remove <n>|clear]`"
            ))),
        }
    }
}

fn parse_category(argument: Option<&str>, action: &str, prefix: &str) -> BridgeResult<LogCategory> {
    let argument = argument.ok_or_else(|| {
        BridgeError::InvalidInput(format!("Usage: `{prefix}spy {action} <LOG_TYPE>`"))
    })?;
    argument.parse::<LogCategory>().map_err(|_| {
        BridgeError::InvalidInput(format!(
            "Invalid log type. Use `{prefix}spy list` to see the available types."
        ))
    })
}

fn describe(outcome: GhostOutcome) -> String {
    match outcome {
        GhostOutcome::AlreadyActive => "ℹ️ Ghost mode is already active.".to_string(),
        GhostOutcome::AlreadyPending => {
            "ℹ️ Ghost mode is already set to activate on your next join.".to_string()
        }
        GhostOutcome::PendingCancelled => "✅ Pending ghost mode cancelled.".to_string(),
        GhostOutcome::NotActive => "ℹ️ Ghost mode is not active.".to_string(),
        GhostOutcome::Armed => "⏳ Ghost mode armed.".to_string(),
        GhostOutcome::Activated { play_time } => format!("👻 Ghost mode activated after {play_time}."),
        GhostOutcome::Deactivated { session, .. } => {
            format!("👁️ Ghost mode deactivated after {session}.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::harness;
    use crate::forwarder::Outbound;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spy_requires_link() {
        let h = harness().await;
        assert!(h.run("admin", "!spy on").await.contains("must be verified"));
    }

    #[tokio::test]
    async fn test_spy_commands() {
        let h = harness().await;
        h.link("admin", "Alice").await;

        assert!(h.run("admin", "!spy clear").await.starts_with("✅"));
        assert!(h.run("admin", "!spy add chat").await.contains("**CHAT**"));
        assert!(h.run("admin", "!spy add NOPE").await.contains("Invalid log type"));
        assert!(h.run("admin", "!spy add").await.contains("Usage"));
        assert!(h.run("admin", "!spy").await.contains("Currently suppressed:** CHAT"));
        assert!(h.run("admin", "!spy list").await.contains("BUILT_ENTITY"));
        assert!(h.run("admin", "!spy remove CHAT").await.starts_with("✅"));
        assert!(h.run("admin", "!spy").await.contains("Currently suppressed:** None"));

        let sent = h.game.sent();
        assert!(sent.iter().any(|c| c.contains(r#"storage.ghostwire_spy_mode["Alice"] = {"CHAT"}"#)));
        assert!(sent.last().unwrap().contains(r#"storage.ghostwire_spy_mode["Alice"] = nil"#));
    }

    #[tokio::test]
    async fn test_ghost_commands() {
        let mut h = harness().await;
        h.link("admin", "Alice").await;

        assert!(h.run("admin", "!ghost on").await.contains("must be online"));
        h.visibility.handle_join("Alice", false).await;
        h.clock.advance(Duration::from_secs(10));

        let reply = h.run("admin", "!ghost on").await;
        assert!(reply.contains("after 10s"), "{reply}");
        assert!(h.run("admin", "!ghost on").await.contains("already active"));
        assert!(h.run("admin", "!spy off").await.contains("managed by ghost mode"));
        assert!(h.run("admin", "!unlink").await.contains("ghost mode off"));
        assert!(h.run("admin", "!ghost").await.contains("👻 Active"));

        h.clock.advance(Duration::from_secs(30));
        let reply = h.run("admin", "!ghost off").await;
        assert!(reply.contains("after 30s"), "{reply}");
        assert!(reply.contains("fake join"), "{reply}");
        assert!(h.run("admin", "!ghost off").await.contains("not active"));

        let mut presence = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            presence.push(event);
        }
        assert!(presence.contains(&Outbound::PlayerJoined {
            name: "Alice".to_string()
        }));
    }

    #[tokio::test]
    async fn test_prelogin() {
        let h = harness().await;
        h.link("admin", "Alice").await;
        assert!(h.run("admin", "!ghost prelogin").await.contains("next join"));
        assert!(h.run("admin", "!ghost prelogin").await.contains("already set"));
        assert!(h.run("admin", "!ghost off").await.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_auto_silent_management() {
        let h = harness().await;
        assert!(h.run("admin", "!ghost commands").await.contains("No auto-silent commands"));
        assert!(h.run("admin", "!ghost commands add editor").await.starts_with("✅"));
        assert!(h.run("admin", "!ghost commands add editor").await.contains("already"));
        assert!(h.run("admin", "!ghost commands add c").await.starts_with("✅"));
        assert_eq!(
            h.run("admin", "!ghost commands").await,
            "**⚡ Auto-silent commands:**\n1. `editor`\n2. `c`"
        );
        assert!(h.run("admin", "!ghost commands remove x").await.contains("Usage"));
        assert!(h.run("admin", "!ghost commands remove 3").await.contains("invalid command number"));
        assert!(h.run("admin", "!ghost commands remove 1").await.contains("`editor`"));
        assert!(h.run("admin", "!ghost commands clear").await.starts_with("✅"));
    }
}
