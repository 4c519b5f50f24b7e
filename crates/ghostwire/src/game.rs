//! Supervision of the game server child process.
//!
//! Stdout and stderr are read line by line into the bridge's log channel.
//! Commands are written to stdin. On shutdown the game is asked to quit and
//! killed if it does not exit in time.

use crate::config::GameSettings;
use async_trait::async_trait;
use ghostwire_core::{GameProcess, ShutdownState};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const QUIT_COMMAND: &str = "/quit";
const QUIT_GRACE: Duration = Duration::from_secs(10);

/// A game server running as a child process.
#[derive(Debug)]
pub struct ChildGame {
    stdin: Mutex<Option<ChildStdin>>,
    running: AtomicBool,
}

impl ChildGame {
    /// Starts the executable and the task supervising it.
    ///
    /// Every output line is sent to `lines`. Lines longer than
    /// `max_line_len` bytes are dropped without being buffered in full. The
    /// returned handle completes once the process has exited and its output
    /// is drained.
    pub fn spawn(
        settings: &GameSettings,
        max_line_len: usize,
        lines: mpsc::Sender<String>,
        shutdown: ShutdownState,
    ) -> std::io::Result<(Arc<Self>, JoinHandle<()>)> {
        let mut child = Command::new(&settings.executable)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        info!(
            "🎮 Started game server {} (pid {:?})",
            settings.executable,
            child.id()
        );

        let readers: Vec<JoinHandle<()>> = [
            child
                .stdout
                .take()
                .map(|out| forward_lines(out, max_line_len, lines.clone(), "stdout")),
            child
                .stderr
                .take()
                .map(|err| forward_lines(err, max_line_len, lines, "stderr")),
        ]
        .into_iter()
        .flatten()
        .collect();

        let game = Arc::new(Self {
            stdin: Mutex::new(child.stdin.take()),
            running: AtomicBool::new(true),
        });

        let supervised = game.clone();
        let handle = tokio::spawn(async move {
            supervised.supervise(child, shutdown).await;
            for reader in readers {
                let _ = reader.await;
            }
            debug!("Game output drained");
        });

        Ok((game, handle))
    }

    async fn supervise(&self, mut child: Child, shutdown: ShutdownState) {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => info!("🎮 Game server exited"),
                Ok(status) => warn!("⚠️ Game server exited with {}", status),
                Err(e) => error!("❌ Failed to wait for the game server: {}", e),
            },
            _ = shutdown.wait() => self.stop(&mut child).await,
        }
        self.running.store(false, Ordering::Release);
        self.stdin.lock().await.take();
    }

    async fn stop(&self, child: &mut Child) {
        info!("🛑 Asking the game server to quit");
        self.send(QUIT_COMMAND).await;
        match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => info!("✅ Game server stopped ({})", status),
            Ok(Err(e)) => error!("❌ Failed to wait for the game server: {}", e),
            Err(_) => {
                warn!("⏰ Game server did not quit within {:?}, killing it", QUIT_GRACE);
                if let Err(e) = child.kill().await {
                    error!("❌ Failed to kill the game server: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl GameProcess for ChildGame {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn send(&self, command: &str) -> bool {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return false;
        };
        let written = async {
            pipe.write_all(command.as_bytes()).await?;
            pipe.write_all(b"\n").await?;
            pipe.flush().await
        }
        .await;
        match written {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Could not write to the game server: {}", e);
                false
            }
        }
    }
}

/// Reads `reader` line by line into `lines`. Invalid UTF-8 is replaced
/// rather than ending the stream.
fn forward_lines<R>(
    reader: R,
    max_line_len: usize,
    lines: mpsc::Sender<String>,
    stream: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match read_bounded_line(&mut reader, &mut buf, max_line_len).await {
                Ok((0, _)) => break,
                Ok((consumed, true)) => {
                    warn!(
                        "⚠️ Dropped a {}-byte line from game {} (limit {})",
                        consumed, stream, max_line_len
                    );
                }
                Ok((_, false)) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']);
                    if lines.send(line.to_string()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("⚠️ Reading game {} failed: {}", stream, e);
                    break;
                }
            }
        }
        debug!("Game {} closed", stream);
    })
}

/// Reads up to and including the next newline, keeping at most `limit`
/// bytes of it (plus the newline) in `buf`. The rest of an oversized line is
/// consumed and discarded.
///
/// Returns the number of bytes consumed, 0 at end of stream, and whether the
/// line went over `limit`.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<(usize, bool)>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok((consumed, oversized));
        }
        let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };
        let content = chunk.strip_suffix(b"\n").unwrap_or(chunk);
        if !oversized && content.len() > limit.saturating_sub(buf.len()) {
            oversized = true;
        }
        if !oversized {
            buf.extend_from_slice(chunk);
        }
        let used = chunk.len();
        reader.consume(used);
        consumed += used;
        if complete {
            return Ok((consumed, oversized));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> GameSettings {
        GameSettings {
            executable: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn test_output_lines_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = ShutdownState::new();
        let (game, handle) =
            ChildGame::spawn(&shell("echo one; echo two 1>&2; printf three"), 1024, tx, shutdown).unwrap();

        handle.await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines.sort();
        assert_eq!(lines, vec!["one".to_string(), "three".to_string(), "two".to_string()]);
        assert!(!game.is_running());
        assert!(!game.send("/players").await);
    }

    #[tokio::test]
    async fn test_commands_reach_stdin() {
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = ShutdownState::new();
        let (game, handle) = ChildGame::spawn(&shell("read line; echo \"got $line\""), 1024, tx, shutdown).unwrap();

        assert!(game.is_running());
        assert!(game.send("/players").await);
        assert_eq!(rx.recv().await.as_deref(), Some("got /players"));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_sends_quit() {
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = ShutdownState::new();
        let (game, handle) =
            ChildGame::spawn(&shell("read line; echo \"bye $line\""), 1024, tx, shutdown.clone()).unwrap();

        shutdown.initiate_shutdown();
        handle.await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("bye /quit"));
        assert!(!game.is_running());
    }

    #[tokio::test]
    async fn test_oversized_lines_are_dropped() {
        let (tx, mut rx) = mpsc::channel(16);
        let script = "head -c 100000 /dev/zero | tr '\\0' a; echo; \
                      head -c 16 /dev/zero | tr '\\0' b; echo; \
                      head -c 17 /dev/zero | tr '\\0' c; echo; echo ok";
        let (_game, handle) = ChildGame::spawn(&shell(script), 16, tx, ShutdownState::new()).unwrap();

        handle.await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(lines, vec!["b".repeat(16), "ok".to_string()]);
    }

    #[tokio::test]
    async fn test_bounded_read_keeps_the_stream_aligned() {
        let input: &[u8] = b"short\nthis line is far too long\r\nnext";
        let mut reader = BufReader::with_capacity(4, input);
        let mut buf = Vec::new();

        assert_eq!(read_bounded_line(&mut reader, &mut buf, 8).await.unwrap(), (6, false));
        assert_eq!(buf, b"short\n");

        buf.clear();
        assert_eq!(read_bounded_line(&mut reader, &mut buf, 8).await.unwrap(), (27, true));
        assert!(buf.len() <= 8);

        buf.clear();
        assert_eq!(read_bounded_line(&mut reader, &mut buf, 8).await.unwrap(), (4, false));
        assert_eq!(buf, b"next");

        buf.clear();
        assert_eq!(read_bounded_line(&mut reader, &mut buf, 8).await.unwrap(), (0, false));
    }

    #[tokio::test]
    async fn test_missing_executable_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let settings = GameSettings {
            executable: "/nonexistent/ghostwire-game".to_string(),
            args: vec![],
        };
        assert!(ChildGame::spawn(&settings, 1024, tx, ShutdownState::new()).is_err());
    }
}
