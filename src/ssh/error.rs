// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, session setup and remote command failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("authentication failed: no valid credentials")]
    AuthenticationFailed,

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("session setup failed: {0}")]
    SessionFailed(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("remote command exited with status {0}")]
    ExitStatus(u32),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("no command has been started on this session")]
    NotStarted,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
