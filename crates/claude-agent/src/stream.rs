use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::types::Message;
use crate::{ClaudeAgentError, Result};

// ─── Line decoding ────────────────────────────────────────────────────────

/// Decode one JSONL line.
///
/// Blank lines and lines that are valid JSON with a `"type"` this crate does
/// not model (e.g. `rate_limit_event`) decode to `Ok(None)` so a newer SDK
/// never breaks an older reader.
pub fn decode_line(line: &str) -> Result<Option<Message>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Message>(trimmed) {
        Ok(msg) => Ok(Some(msg)),
        Err(e) => {
            if is_unknown_message_type(trimmed) {
                tracing::debug!(line = %trimmed, "skipping unknown stream-json message type");
                return Ok(None);
            }
            Err(ClaudeAgentError::Parse {
                line: trimmed.to_owned(),
                source: e,
            })
        }
    }
}

const KNOWN_TYPES: &[&str] = &[
    "system",
    "assistant",
    "user",
    "result",
    "stream_event",
    "tool_progress",
];

fn is_unknown_message_type(line: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return false;
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some(t) => !KNOWN_TYPES.contains(&t),
        None => false,
    }
}

// ─── MessageStream ────────────────────────────────────────────────────────

/// An async stream of [`Message`]s read from any line-oriented source:
/// the stdout of an SDK bridge, a socket, or a recorded `.jsonl` file.
///
/// Backed by a Tokio mpsc channel. A background task owns the reader and
/// forwards decoded messages until it sees a terminal `result` message, hits
/// EOF, or the receiver is dropped.
///
/// ```rust,ignore
/// use claude_agent::MessageStream;
/// use futures::StreamExt;
///
/// let file = tokio::fs::File::open("session.jsonl").await?;
/// let mut stream = MessageStream::from_reader(tokio::io::BufReader::new(file));
/// while let Some(msg) = stream.next().await {
///     println!("{:?}", msg?);
/// }
/// ```
pub struct MessageStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl MessageStream {
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Err(e) => {
                        let _ = tx.send(Err(ClaudeAgentError::Io(e))).await;
                        break;
                    }
                    Ok(None) => break, // EOF
                    Ok(Some(line)) => line,
                };
                match decode_line(&line) {
                    Ok(None) => continue,
                    Ok(Some(msg)) => {
                        let terminal = msg.is_terminal();
                        if tx.send(Ok(msg)).await.is_err() {
                            break; // Receiver dropped
                        }
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        MessageStream { rx }
    }
}

impl Stream for MessageStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
