// ABOUTME: Transport traits between the host pipeline and the SSH client.
// ABOUTME: Lets the pipeline run against russh sessions or in-memory doubles.

use super::client::Session;
use super::error::Result;
use super::target::HostTarget;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Raw output of the remote process.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// The stdout and stderr streams of one remote process.
pub struct OutputStreams {
    pub stdout: ByteStream,
    pub stderr: ByteStream,
}

/// Pseudo-terminal geometry requested before the command starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u32,
    pub rows: u32,
}

impl Default for PtySize {
    fn default() -> Self {
        Self { cols: 80, rows: 40 }
    }
}

/// Opens connections to remote hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn RemoteShell>>;
}

/// One connected host running at most one command.
///
/// Calls follow the order `open_session`, `request_pty`, `output_streams`,
/// `start`, `wait`. `close` may be called at any point and more than once.
#[async_trait]
pub trait RemoteShell: Send {
    /// Open the remote execution context.
    async fn open_session(&mut self) -> Result<()>;

    /// Attach a pseudo-terminal to the execution context.
    async fn request_pty(&mut self, size: PtySize) -> Result<()>;

    /// Hand out the output streams. Only the first call succeeds.
    fn output_streams(&mut self) -> Result<OutputStreams>;

    /// Start the command. Output flows into the streams from here on.
    async fn start(&mut self, command: &str) -> Result<()>;

    /// Wait for the command to exit. Non-zero exit status is an error.
    async fn wait(&mut self) -> Result<()>;

    /// Release every transport resource.
    async fn close(&mut self) -> Result<()>;
}

/// Transport backed by real SSH connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshTransport;

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn RemoteShell>> {
        let session = Session::connect(target).await?;
        Ok(Box::new(session))
    }
}
