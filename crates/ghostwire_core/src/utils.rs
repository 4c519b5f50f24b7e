//! Text helpers shared by the forwarder and the command layer.

use chrono::Duration;

/// Formats a session length for presence listings, e.g. `2h 30m 15s`.
///
/// Hours and minutes are omitted when zero; seconds are always present.
pub fn format_duration(d: Duration) -> String {
    let total = d.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

/// Formats a play time for fake join/leave notices: `1h 5m`, `5m 3s` or `3s`.
pub fn format_play_time(d: Duration) -> String {
    let total = d.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Escapes the markdown characters that commonly appear in raw console output.
pub fn escape_markdown(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if matches!(c, '_' | '*' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Breaks `@here` and `@everyone` with a zero-width space so they cannot ping.
pub fn defuse_mentions(text: &str) -> String {
    text.replace("@here", "@\u{200B}here")
        .replace("@everyone", "@\u{200B}everyone")
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Substitutes `{username}` and `{playtime}` in a message template.
pub fn render_template(template: &str, username: &str, playtime: &str) -> String {
    template
        .replace("{username}", username)
        .replace("{playtime}", playtime)
}
