// ABOUTME: Runs the filter command on one host and streams its output.
// ABOUTME: Owns the session and both line streamers; every exit path releases them.

use crate::ssh::{self, HostTarget, PtySize, RemoteShell, Transport};
use crate::stream::{Message, StreamLabel, stream_lines};
use std::fmt;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

/// Host-scoped failure. Never aborts other hosts.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("[{host}] unable to connect: {source}")]
    Connection {
        host: String,
        #[source]
        source: ssh::Error,
    },

    #[error("[{host}] unable to set up session: {source}")]
    Session {
        host: String,
        #[source]
        source: ssh::Error,
    },

    #[error("[{host}] command failed: {source}")]
    Execution {
        host: String,
        #[source]
        source: ssh::Error,
    },

    #[error("[{host}] runner aborted: {reason}")]
    Aborted { host: String, reason: String },
}

impl HostError {
    pub fn host(&self) -> &str {
        match self {
            HostError::Connection { host, .. }
            | HostError::Session { host, .. }
            | HostError::Execution { host, .. }
            | HostError::Aborted { host, .. } => host,
        }
    }
}

/// Progress of one host through its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Connecting,
    SessionOpen,
    PtyRequested,
    StreamsBound,
    Executing,
    Waiting,
    Closed,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostState::Idle => "idle",
            HostState::Connecting => "connecting",
            HostState::SessionOpen => "session-open",
            HostState::PtyRequested => "pty-requested",
            HostState::StreamsBound => "streams-bound",
            HostState::Executing => "executing",
            HostState::Waiting => "waiting",
            HostState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Everything one host run needs besides its channels.
pub struct HostJob<'a> {
    pub transport: &'a dyn Transport,
    pub target: &'a HostTarget,
    pub script: &'a str,
    pub pty: PtySize,
    /// Bounds concurrent connection attempts across hosts.
    pub connect_gate: Option<&'a Semaphore>,
}

struct Progress<'a> {
    host: &'a str,
    state: HostState,
}

impl Progress<'_> {
    fn advance(&mut self, next: HostState) {
        tracing::debug!(host = %self.host, from = %self.state, to = %next, "host state");
        self.state = next;
    }
}

/// Run `job.script` on one host, sending stdout lines to `out` and stderr
/// lines to `err`.
///
/// Both channels are closed when this returns, on success and on failure.
pub async fn run_host(
    job: HostJob<'_>,
    out: mpsc::Sender<Message>,
    err: mpsc::Sender<Message>,
) -> Result<(), HostError> {
    let host = job.target.host.as_str();
    let mut progress = Progress {
        host,
        state: HostState::Idle,
    };

    progress.advance(HostState::Connecting);
    let mut shell = connect(&job).await.map_err(|source| HostError::Connection {
        host: host.to_string(),
        source,
    })?;

    let mut streamers = JoinSet::new();
    let mut result = drive(&job, shell.as_mut(), &mut progress, &mut streamers, out, err).await;

    if let Err(e) = shell.close().await {
        tracing::warn!(host = %host, "failed to close session cleanly: {e}");
    }
    drop(shell);

    // Closing the session ended both streams, so this only drains what is buffered.
    while let Some(joined) = streamers.join_next().await {
        match joined {
            Ok(lines) => tracing::debug!(host = %host, lines, "stream drained"),
            Err(e) if e.is_panic() => {
                let reason = format!("line streamer {}", panic_reason(e.into_panic()));
                tracing::warn!(host = %host, "{reason}");
                if result.is_ok() {
                    result = Err(HostError::Aborted {
                        host: host.to_string(),
                        reason,
                    });
                }
            }
            Err(e) => tracing::warn!(host = %host, "line streamer failed: {e}"),
        }
    }
    progress.advance(HostState::Closed);

    result
}

/// Readable text from a panic payload.
pub(crate) fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked".to_string()
    }
}

async fn connect(job: &HostJob<'_>) -> ssh::Result<Box<dyn RemoteShell>> {
    let _permit = match job.connect_gate {
        Some(gate) => Some(gate.acquire().await.map_err(|_| {
            ssh::Error::Connection("connection gate closed".to_string())
        })?),
        None => None,
    };
    job.transport.connect(job.target).await
}

async fn drive(
    job: &HostJob<'_>,
    shell: &mut dyn RemoteShell,
    progress: &mut Progress<'_>,
    streamers: &mut JoinSet<usize>,
    out: mpsc::Sender<Message>,
    err: mpsc::Sender<Message>,
) -> Result<(), HostError> {
    let host = job.target.host.clone();
    let session_error = |source: ssh::Error| HostError::Session {
        host: host.clone(),
        source,
    };
    let execution_error = |source: ssh::Error| HostError::Execution {
        host: host.clone(),
        source,
    };

    shell.open_session().await.map_err(session_error)?;
    progress.advance(HostState::SessionOpen);

    shell.request_pty(job.pty).await.map_err(session_error)?;
    progress.advance(HostState::PtyRequested);

    let streams = shell.output_streams().map_err(session_error)?;
    streamers.spawn(stream_lines(streams.stdout, out, host.clone(), StreamLabel::stdout()));
    streamers.spawn(stream_lines(streams.stderr, err, host.clone(), StreamLabel::stderr()));
    progress.advance(HostState::StreamsBound);

    shell.start(job.script).await.map_err(execution_error)?;
    progress.advance(HostState::Executing);

    progress.advance(HostState::Waiting);
    shell.wait().await.map_err(execution_error)?;

    Ok(())
}
