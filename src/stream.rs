// ABOUTME: Turns a raw remote output stream into host-tagged line messages.
// ABOUTME: Only complete lines are forwarded; a truncated stream just stops producing.

use console::Style;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// One captured line from one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub host: String,
    /// Line text including its terminator.
    pub content: String,
}

/// Decoration applied to every line of one stream.
#[derive(Debug, Clone)]
pub struct StreamLabel {
    pub prefix: &'static str,
    pub style: Option<Style>,
}

impl StreamLabel {
    pub fn stdout() -> Self {
        Self {
            prefix: "",
            style: None,
        }
    }

    pub fn stderr() -> Self {
        Self {
            prefix: "Error:",
            style: Some(Style::new().red().force_styling(true)),
        }
    }

    /// `prefix + styled(body) + terminator`.
    pub fn apply(&self, line: &str) -> String {
        let body = line.trim_end_matches(['\r', '\n']);
        let terminator = &line[body.len()..];
        match &self.style {
            Some(style) => format!("{}{}{}", self.prefix, style.apply_to(body), terminator),
            None => format!("{}{}{}", self.prefix, body, terminator),
        }
    }
}

/// Forward every complete line of `reader` to `tx` until the stream ends.
///
/// Read errors end the stream like EOF does. Returns the number of lines sent.
pub async fn stream_lines<R>(
    reader: R,
    tx: mpsc::Sender<Message>,
    host: String,
    label: StreamLabel,
) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut sent = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) if buf.last() != Some(&b'\n') => {
                tracing::debug!(host = %host, bytes = buf.len(), "dropping unterminated trailing fragment");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(host = %host, "stream read failed: {e}");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let message = Message {
            host: host.clone(),
            content: label.apply(&line),
        };
        if tx.send(message).await.is_err() {
            tracing::debug!(host = %host, "receiver dropped, stopping stream");
            break;
        }
        sent += 1;
    }

    sent
}
