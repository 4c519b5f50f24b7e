//! Classification of raw game server output lines.
//!
//! The game process writes two kinds of lines the bridge cares about:
//!
//! * chat-style lines, prefixed with a `YYYY-MM-DD HH:MM:SS ` timestamp and a
//!   bracketed tag such as `[JOIN]`
//! * engine lines, prefixed with a `<seconds>.<millis> ` tick counter, which
//!   carry server lifecycle information
//!
//! Everything else is dropped unless it matches a short allow-list of
//! messages worth passing through verbatim. Classification is a pure
//! function of one line; no state is carried between lines.

use crate::spy::LogCategory;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::fmt;

static CHAT_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[-/]\d\d[-/]\d\d \d\d:\d\d:\d\d ").expect("valid regex"));

static ENGINE_TICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d{3} ").expect("valid regex"));

static CHAT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(CHAT|JOIN|LEAVE|KICK|BAN|DISCORD|DISCORD-EMBED)\]").expect("valid regex")
});

// Game ids are bounded to 20 digits; anything longer is not a real id.
static GAME_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Matching server game `(\d{1,20})` has been created").expect("valid regex")
});

static PASSTHROUGH: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^Player .+ doesn't exist\.").expect("valid regex"),
        Regex::new(r"^.+ wasn't banned\.").expect("valid regex"),
    ]
});

const NOISE: &[&str] = &["Sendto failed (but can be probably ignored)"];

/// Bracketed tag of a chat-style line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTag {
    Chat,
    Join,
    Leave,
    Kick,
    Ban,
    Discord,
    DiscordEmbed,
}

impl ChatTag {
    fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "CHAT" => ChatTag::Chat,
            "JOIN" => ChatTag::Join,
            "LEAVE" => ChatTag::Leave,
            "KICK" => ChatTag::Kick,
            "BAN" => ChatTag::Ban,
            "DISCORD" => ChatTag::Discord,
            "DISCORD-EMBED" => ChatTag::DiscordEmbed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatTag::Chat => "CHAT",
            ChatTag::Join => "JOIN",
            ChatTag::Leave => "LEAVE",
            ChatTag::Kick => "KICK",
            ChatTag::Ban => "BAN",
            ChatTag::Discord => "DISCORD",
            ChatTag::DiscordEmbed => "DISCORD-EMBED",
        }
    }

    /// The spy-mode category this tag falls under, if any.
    pub fn category(&self) -> Option<LogCategory> {
        match self {
            ChatTag::Chat => Some(LogCategory::Chat),
            ChatTag::Join => Some(LogCategory::Join),
            ChatTag::Leave => Some(LogCategory::Leave),
            ChatTag::Kick => Some(LogCategory::Kicked),
            ChatTag::Ban | ChatTag::Discord | ChatTag::DiscordEmbed => None,
        }
    }
}

impl fmt::Display for ChatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle signal extracted from an engine line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    /// The server finished creating the game and is accepting players
    ServerInGame,
    /// The server opened its broadcast socket
    ServerStarted,
    /// A save completed
    SaveFinished,
    /// The multiplayer session ended normally
    ServerStopped,
    /// The multiplayer session ended with an error
    ConnectionLost,
    /// The matching-server game id
    GameId(String),
}

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Known transient noise, or an empty line
    Noise,
    /// The line exceeded the configured length limit
    Rejected { len: usize },
    /// A tagged chat-style event with the timestamp and tag removed
    Chat { tag: ChatTag, payload: String },
    /// An engine line; may carry zero or more signals
    Engine(Vec<EngineSignal>),
    /// An allow-listed message forwarded verbatim
    Passthrough(String),
    /// Anything else
    Dropped,
}

impl Classified {
    /// The game account an event is about, if one can be read from it.
    ///
    /// JOIN/LEAVE/KICK/BAN payloads start with the account name; CHAT payloads
    /// have the form `Name: message`.
    pub fn subject(&self) -> Option<&str> {
        let Classified::Chat { tag, payload } = self else {
            return None;
        };
        match tag {
            ChatTag::Join | ChatTag::Leave | ChatTag::Kick | ChatTag::Ban => {
                payload.split_whitespace().next()
            }
            ChatTag::Chat => payload
                .split_once(':')
                .map(|(name, _)| name.trim())
                .filter(|name| !name.is_empty() && !name.contains(char::is_whitespace)),
            ChatTag::Discord | ChatTag::DiscordEmbed => None,
        }
    }
}

/// Classifies one newline-stripped line of game output.
pub fn classify(line: &str, max_len: usize) -> Classified {
    if line.len() > max_len {
        return Classified::Rejected { len: line.len() };
    }

    let line = line.trim();
    if line.is_empty() || NOISE.iter().any(|noise| line.contains(noise)) {
        return Classified::Noise;
    }

    if let Some(ts) = CHAT_TIMESTAMP.find(line) {
        return classify_chat(line[ts.end()..].trim());
    }

    if ENGINE_TICK.is_match(line) {
        return Classified::Engine(engine_signals(line));
    }

    if PASSTHROUGH.iter().any(|pattern| pattern.is_match(line)) {
        return Classified::Passthrough(line.to_string());
    }

    Classified::Dropped
}

fn classify_chat(rest: &str) -> Classified {
    let Some(caps) = CHAT_TAG.captures(rest) else {
        return Classified::Dropped;
    };
    let Some(tag) = caps.get(1).and_then(|m| ChatTag::parse(m.as_str())) else {
        return Classified::Dropped;
    };
    let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);
    Classified::Chat {
        tag,
        payload: rest[consumed..].trim_start().to_string(),
    }
}

fn engine_signals(line: &str) -> Vec<EngineSignal> {
    let mut signals = Vec::new();
    if line.contains("Quitting: multiplayer error.") {
        signals.push(EngineSignal::ConnectionLost);
    }
    if line.contains("Opening socket for broadcast") {
        signals.push(EngineSignal::ServerStarted);
    }
    if line.contains("Saving finished") {
        signals.push(EngineSignal::SaveFinished);
    }
    if line.contains("Quitting multiplayer connection.") {
        signals.push(EngineSignal::ServerStopped);
    }
    if line.contains("changing state from(CreatingGame) to(InGame)") {
        signals.push(EngineSignal::ServerInGame);
    }
    if let Some(id) = GAME_ID.captures(line).and_then(|caps| caps.get(1)) {
        signals.push(EngineSignal::GameId(id.as_str().to_string()));
    }
    signals
}
