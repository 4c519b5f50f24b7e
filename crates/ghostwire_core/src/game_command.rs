//! Builders for commands sent to the game process.
//!
//! Everything that runs in the game's scripting console goes through here:
//! the silent-execution prefix, string escaping, shorthand expansion for the
//! `sc` command, and the snippets ghost and spy mode use to mirror their
//! state into the game.

use crate::spy::LogCategory;

/// Prefix that runs a script without echoing it to the game log or chat.
pub const SILENT_PREFIX: &str = "/silent-command ";

/// Script-side globals. `game.speed = 2` is a script, not a command for a
/// player called `game`.
const SCRIPT_GLOBALS: &[&str] = &[
    "game",
    "script",
    "remote",
    "commands",
    "settings",
    "rcon",
    "rendering",
    "global",
    "storage",
    "prototypes",
    "helpers",
];

/// Shorthands that act on a player and need one to target.
const PLAYER_SHORTHANDS: &[&str] = &[
    "editor",
    "cheat",
    "cheatmode",
    "spectator",
    "god",
    "godmode",
    "zoom",
    "teleport",
    "tp",
    "give",
    "insert",
    "clear_inventory",
    "clear",
    "speed_modifier",
    "reach",
    "long_reach",
    "mining_speed",
    "crafting_speed",
    "research_all",
    "chart_all",
    "reveal_all",
    "map",
];

/// Escapes text for use inside a double-quoted script string.
pub fn escape_script_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Wraps a script in the silent-execution prefix.
pub fn silent(script: &str) -> String {
    format!("{SILENT_PREFIX}{script}")
}

/// A visible console command, with the leading `/` added when missing.
pub fn open_command(text: &str) -> String {
    let text = text.trim();
    if text.starts_with('/') {
        text.to_string()
    } else {
        format!("/{text}")
    }
}

/// An `sc` argument split into an optional explicit target and the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub target: Option<String>,
    pub command: String,
}

/// Parses `Player.command` targeting. Anything else, including scripts that
/// start with a global such as `game.`, is returned untargeted.
pub fn parse_player_command(args: &str) -> PlayerCommand {
    let args = args.trim();
    if let Some((head, tail)) = args.split_once('.') {
        let is_global = SCRIPT_GLOBALS
            .iter()
            .any(|global| head.eq_ignore_ascii_case(global));
        let looks_like_name = !head.is_empty()
            && head
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if looks_like_name && !tail.is_empty() && !is_global {
            return PlayerCommand {
                target: Some(head.to_string()),
                command: tail.to_string(),
            };
        }
    }
    PlayerCommand {
        target: None,
        command: args.to_string(),
    }
}

/// Whether the first word of `command` is a shorthand that acts on a player.
pub fn needs_player_context(command: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .map(|word| {
            let word = word.to_ascii_lowercase();
            PLAYER_SHORTHANDS.contains(&word.as_str())
        })
        .unwrap_or(false)
}

/// Expands a shorthand into a script acting on `player`, falling back to
/// `game.player` when no player is known. Unknown commands are returned
/// unchanged as raw script.
pub fn to_script(command: &str, player: Option<&str>) -> String {
    let words: Vec<&str> = command.split_whitespace().collect();
    let Some(first) = words.first() else {
        return command.to_string();
    };
    let args = &words[1..];
    let p = match player.filter(|name| !name.is_empty()) {
        Some(name) => format!("game.get_player(\"{}\")", escape_script_string(name)),
        None => "game.player".to_string(),
    };

    match first.to_ascii_lowercase().as_str() {
        "editor" => format!("local p = {p}; if p then p.toggle_map_editor() end"),
        "spectator" => format!(
            "local p = {p}; if p then p.spectator = not p.spectator; p.print(\"Spectator: \" .. tostring(p.spectator)) end"
        ),
        "cheat" | "cheatmode" | "cheat_mode" => format!(
            "local p = {p}; if p then p.cheat_mode = not p.cheat_mode; p.print(\"Cheat mode: \" .. tostring(p.cheat_mode)) end"
        ),
        "god" | "godmode" => format!(
            "local p = {p}; if p then if p.character then p.character.destroy(); p.print(\"God mode enabled\") else p.create_character(); p.print(\"God mode disabled\") end end"
        ),
        "zoom" => match args.first() {
            Some(level) => format!("local p = {p}; if p then p.zoom = {level} end"),
            None => format!("local p = {p}; if p then p.print(\"Current zoom: \" .. p.zoom) end"),
        },
        "teleport" | "tp" => match args {
            [x, y, ..] => format!("local p = {p}; if p then p.teleport({{{x}, {y}}}) end"),
            [other] => format!(
                "local p = {p}; local t = game.get_player(\"{}\"); if p and t then p.teleport(t.position, t.surface) end",
                escape_script_string(other)
            ),
            [] => command.to_string(),
        },
        "give" | "insert" => match args {
            [item, rest @ ..] => {
                let count = rest.first().copied().unwrap_or("1");
                format!(
                    "local p = {p}; if p then p.insert{{name=\"{}\", count={count}}} end",
                    escape_script_string(item)
                )
            }
            [] => command.to_string(),
        },
        "clear_inventory" | "clear" => {
            format!("local p = {p}; if p then p.clear_items_inside() end")
        }
        "reach" | "long_reach" => {
            let reach = args.first().copied().unwrap_or("1000");
            format!(
                "local p = {p}; if p then p.character_build_distance_bonus = {reach}; p.character_reach_distance_bonus = {reach} end"
            )
        }
        "mining_speed" => {
            let speed = args.first().copied().unwrap_or("1000");
            format!("local p = {p}; if p then p.force.manual_mining_speed_modifier = {speed} end")
        }
        "crafting_speed" => {
            let speed = args.first().copied().unwrap_or("1000");
            format!("local p = {p}; if p then p.force.manual_crafting_speed_modifier = {speed} end")
        }
        "speed" | "game_speed" => match args.first() {
            Some(speed) => format!("game.speed = {speed}"),
            None => "game.print(\"Current speed: \" .. game.speed)".to_string(),
        },
        "research_all" => {
            format!("local p = {p}; if p then p.force.research_all_technologies() end")
        }
        "chart_all" | "reveal_all" | "map" => {
            format!("local p = {p}; if p then p.force.chart_all() end")
        }
        "always_day" | "day" => format!("local p = {p}; if p then p.surface.always_day = true end"),
        "night" => format!("local p = {p}; if p then p.surface.always_day = false end"),
        "freeze_time" => format!(
            "local p = {p}; if p then p.surface.freeze_daytime = not p.surface.freeze_daytime end"
        ),
        "peaceful" => format!(
            "local p = {p}; if p then p.surface.peaceful_mode = not p.surface.peaceful_mode; p.print(\"Peaceful mode: \" .. tostring(p.surface.peaceful_mode)) end"
        ),
        "kill_enemies" | "kill_biters" => format!(
            "local p = {p}; if p then for _, e in pairs(p.surface.find_entities_filtered{{force=\"enemy\"}}) do e.destroy() end end"
        ),
        "pollution" | "clear_pollution" => {
            format!("local p = {p}; if p then p.surface.clear_pollution() end")
        }
        "time" => "game.print(\"Map age: \" .. game.tick .. \" ticks (\" .. math.floor(game.tick/60/60/60) .. \" hours)\")".to_string(),
        "seed" => format!(
            "local p = {p}; if p then p.print(\"Seed: \" .. p.surface.map_gen_settings.seed) end"
        ),
        _ => command.to_string(),
    }
}

/// Prints a verification code privately to `account` in-game.
pub fn verification_whisper(account: &str, code: &str, prefix: &str) -> String {
    silent(&format!(
        "local p = game.get_player(\"{}\"); if p and p.connected then p.print(\"[Ghostwire Verification] Your code: {code} - confirm it in chat with: {}confirm {code}\", {{color={{r=0.2,g=0.9,b=0.2}}}}) end",
        escape_script_string(account),
        escape_script_string(prefix),
    ))
}

/// Turns `account` into a spectator without a character.
pub fn ghost_hide(account: &str) -> String {
    let name = escape_script_string(account);
    silent(&format!(
        "if game.players[\"{name}\"] then game.players[\"{name}\"].spectator = true; game.players[\"{name}\"].character = nil end"
    ))
}

/// Ends spectator mode for `account`.
pub fn ghost_reveal(account: &str) -> String {
    let name = escape_script_string(account);
    silent(&format!(
        "if game.players[\"{name}\"] then game.players[\"{name}\"].spectator = false end"
    ))
}

/// Mirrors the spy categories of `account` into the game's storage table.
/// Returns `None` for an empty list; use [`spy_clear`] instead.
pub fn spy_store(account: &str, categories: &[LogCategory]) -> Option<String> {
    if categories.is_empty() {
        return None;
    }
    let list = categories
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    Some(silent(&format!(
        "if not storage.ghostwire_spy_mode then storage.ghostwire_spy_mode = {{}} end; storage.ghostwire_spy_mode[\"{}\"] = {{{list}}}",
        escape_script_string(account)
    )))
}

/// Removes `account` from the game's spy storage table.
pub fn spy_clear(account: &str) -> String {
    silent(&format!(
        "if storage.ghostwire_spy_mode then storage.ghostwire_spy_mode[\"{}\"] = nil end",
        escape_script_string(account)
    ))
}
