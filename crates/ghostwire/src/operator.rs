//! Operator console on the bridge's own stdin.
//!
//! A line of the form `@<chat id> <text>` is run as a chat command from that
//! chat account. Any other non-empty line is written to the game as is.

use ghostwire_core::{Bridge, GameProcess, ShutdownState};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, PartialEq, Eq)]
enum OperatorInput<'a> {
    Chat { chat_id: &'a str, text: &'a str },
    Game(&'a str),
}

fn parse(line: &str) -> Option<OperatorInput<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.strip_prefix('@') {
        Some(rest) => {
            let (chat_id, text) = rest.split_once(char::is_whitespace)?;
            Some(OperatorInput::Chat {
                chat_id,
                text: text.trim_start(),
            })
        }
        None => Some(OperatorInput::Game(line)),
    }
}

/// Reads stdin until EOF or shutdown.
pub fn spawn(bridge: Arc<Bridge>, game: Arc<dyn GameProcess>, shutdown: ShutdownState) -> JoinHandle<()> {
    spawn_with_reader(BufReader::new(tokio::io::stdin()), bridge, game, shutdown)
}

fn spawn_with_reader<R>(
    reader: R,
    bridge: Arc<Bridge>,
    game: Arc<dyn GameProcess>,
    shutdown: ShutdownState,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = shutdown.wait() => break,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️ Operator console read failed: {}", e);
                    break;
                }
            };
            match parse(&line) {
                Some(OperatorInput::Chat { chat_id, text }) => {
                    let reply = bridge.on_chat_command(chat_id, text).await;
                    info!("↩️ {}: {}", chat_id, reply);
                }
                Some(OperatorInput::Game(command)) => {
                    if !game.send(command).await {
                        warn!("⚠️ The game server is not accepting input");
                    }
                }
                None => {}
            }
        }
        debug!("Operator console closed");
    })
}
