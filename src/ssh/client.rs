// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, authentication, PTY setup and streaming command output.

use super::error::{Error, Result};
use super::target::HostTarget;
use super::transport::{OutputStreams, PtySize, RemoteShell};
use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

/// Buffer between the channel reader and each output stream.
const PIPE_CAPACITY: usize = 64 * 1024;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

const TERMINAL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

/// Host key verification for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl SshHandler {
    fn for_target(target: &HostTarget) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            trust_on_first_use: target.trust_on_first_use,
            known_hosts_path: target.known_hosts_path.clone(),
        }
    }

    fn remember(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!(host = %self.host, "failed to save host key to known_hosts: {e}");
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            Err(russh::keys::Error::KeyChanged { line }) => {
                tracing::warn!(
                    host = %self.host,
                    line,
                    "host key does not match known_hosts entry, refusing to connect"
                );
                Ok(false)
            }
            Ok(false) if self.trust_on_first_use => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                self.remember(server_public_key);
                Ok(true)
            }
            Err(e) if self.trust_on_first_use => {
                tracing::debug!(host = %self.host, "known_hosts unreadable, trusting key: {e}");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Authentication method resolved from a target.
enum AuthMethod {
    KeyFile(Arc<ssh_key::PrivateKey>),
    Password(String),
    Agent(AgentClient<UnixStream>),
}

impl AuthMethod {
    fn name(&self) -> &'static str {
        match self {
            AuthMethod::KeyFile(_) => "publickey",
            AuthMethod::Password(_) => "password",
            AuthMethod::Agent(_) => "agent",
        }
    }
}

/// Write ends of the output streams, held until the command starts.
struct Sinks {
    stdout: DuplexStream,
    stderr: DuplexStream,
}

/// An established SSH connection with at most one remote command.
pub struct Session {
    host: String,
    handle: Option<Handle<SshHandler>>,
    channel: Option<Channel<Msg>>,
    sinks: Option<Sinks>,
    streams_bound: bool,
    /// Routes channel data into the sinks and yields the exit status.
    reader: Option<JoinHandle<Result<u32>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("connected", &self.handle.is_some())
            .field("channel_open", &self.channel.is_some())
            .field("running", &self.reader.is_some())
            .finish()
    }
}

impl Session {
    /// Connect and authenticate, honouring the target's connect deadline.
    pub async fn connect(target: &HostTarget) -> Result<Self> {
        match target.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::establish(target))
                .await
                .map_err(|_| Error::ConnectTimeout(limit))?,
            None => Self::establish(target).await,
        }
    }

    async fn establish(target: &HostTarget) -> Result<Self> {
        let methods = Self::resolve_auth_methods(target).await?;

        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (target.host.as_str(), target.port),
            SshHandler::for_target(target),
        )
        .await
        .map_err(|e| {
            if e.to_string().contains("Connection refused") {
                Error::Connection(format!(
                    "connection refused to {}:{}",
                    target.host, target.port
                ))
            } else {
                Error::Connection(e.to_string())
            }
        })?;

        for method in methods {
            let name = method.name();
            match Self::authenticate(&mut handle, &target.user, method).await {
                Ok(true) => {
                    tracing::debug!(host = %target.host, method = name, "authenticated");
                    return Ok(Self {
                        host: target.host.clone(),
                        handle: Some(handle),
                        channel: None,
                        sinks: None,
                        streams_bound: false,
                        reader: None,
                    });
                }
                Ok(false) => {
                    tracing::debug!(host = %target.host, method = name, "authentication rejected");
                }
                Err(e) => {
                    tracing::debug!(host = %target.host, method = name, "authentication error: {e}");
                }
            }
        }

        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        Err(Error::AuthenticationFailed)
    }

    /// Configured credentials in the order they are tried.
    async fn resolve_auth_methods(target: &HostTarget) -> Result<Vec<AuthMethod>> {
        let mut methods = Vec::new();

        if let Some(key_path) = &target.key_path {
            match load_secret_key(key_path, None) {
                Ok(key) => methods.push(AuthMethod::KeyFile(Arc::new(key))),
                Err(e) if target.password.is_some() => {
                    tracing::warn!(
                        host = %target.host,
                        "skipping key {}: {e}",
                        key_path.display()
                    );
                }
                Err(e) => {
                    return Err(Error::KeyLoadFailed {
                        path: key_path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(password) = &target.password {
            methods.push(AuthMethod::Password(password.clone()));
        }

        if methods.is_empty() {
            methods.push(Self::ambient_auth_method().await?);
        }

        Ok(methods)
    }

    /// SSH agent, then the usual key locations under ~/.ssh.
    async fn ambient_auth_method() -> Result<AuthMethod> {
        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(AuthMethod::Agent(agent));
        }

        let home = std::env::var("HOME").map_err(|_| {
            Error::AgentUnavailable("SSH agent not available and HOME not set".to_string())
        })?;

        for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
            let key_path = format!("{home}/.ssh/{name}");
            if let Ok(key) = load_secret_key(&key_path, None) {
                return Ok(AuthMethod::KeyFile(Arc::new(key)));
            }
        }

        Err(Error::AgentUnavailable(
            "SSH agent not available and no default keys found".to_string(),
        ))
    }

    async fn authenticate(
        handle: &mut Handle<SshHandler>,
        user: &str,
        method: AuthMethod,
    ) -> Result<bool> {
        match method {
            AuthMethod::KeyFile(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;
                Ok(result.success())
            }
            AuthMethod::Password(password) => {
                let result = handle.authenticate_password(user, password).await?;
                Ok(result.success())
            }
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list agent keys: {e}"))
                })?;

                for key in keys {
                    match handle
                        .authenticate_publickey_with(user, key, None, &mut agent)
                        .await
                    {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
        }
    }

    /// Open the session channel the command will run in.
    pub async fn open_session(&mut self) -> Result<()> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::SessionFailed("connection is closed".to_string()))?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| Error::SessionFailed(format!("failed to open channel: {e}")))?;
        self.channel = Some(channel);
        Ok(())
    }

    /// Request an xterm PTY so remote tools colour their output.
    pub async fn request_pty(&mut self, size: PtySize) -> Result<()> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::SessionFailed("no open channel".to_string()))?;

        channel
            .request_pty(true, "xterm", size.cols, size.rows, 0, 0, TERMINAL_MODES)
            .await
            .map_err(|e| Error::SessionFailed(format!("failed to request pty: {e}")))?;

        match await_reply(channel, &mut Vec::new()).await {
            Some(true) => Ok(()),
            Some(false) => Err(Error::SessionFailed(
                "server refused the pty request".to_string(),
            )),
            None => Err(Error::SessionFailed(
                "channel closed before the pty request was answered".to_string(),
            )),
        }
    }

    /// Create the stdout and stderr streams. Only the first call succeeds.
    pub fn output_streams(&mut self) -> Result<OutputStreams> {
        if self.streams_bound {
            return Err(Error::SessionFailed(
                "output streams already handed out".to_string(),
            ));
        }

        let (stdout_sink, stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_sink, stderr) = tokio::io::duplex(PIPE_CAPACITY);
        self.sinks = Some(Sinks {
            stdout: stdout_sink,
            stderr: stderr_sink,
        });
        self.streams_bound = true;

        Ok(OutputStreams {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }

    /// Execute the command and start routing its output.
    pub async fn start(&mut self, command: &str) -> Result<()> {
        let mut channel = self
            .channel
            .take()
            .ok_or_else(|| Error::CommandFailed("no open channel".to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec command: {e}")))?;

        let mut early = Vec::new();
        match await_reply(&mut channel, &mut early).await {
            Some(true) => {}
            Some(false) => {
                let _ = channel.close().await;
                return Err(Error::CommandFailed(
                    "server refused to execute the command".to_string(),
                ));
            }
            None => {
                return Err(Error::CommandFailed(
                    "channel closed before the command started".to_string(),
                ));
            }
        }

        let sinks = self.sinks.take();
        self.reader = Some(tokio::spawn(route_output(channel, sinks, early)));
        Ok(())
    }

    /// Wait until the remote command exits.
    pub async fn wait(&mut self) -> Result<()> {
        let reader = self.reader.take().ok_or(Error::NotStarted)?;

        let status = reader
            .await
            .map_err(|e| Error::CommandFailed(format!("output reader failed: {e}")))??;

        match status {
            0 => Ok(()),
            code => Err(Error::ExitStatus(code)),
        }
    }

    /// Stop the command and disconnect. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.sinks = None;

        if let Some(channel) = self.channel.take() {
            let _ = channel.close().await;
        }

        if let Some(handle) = self.handle.take() {
            handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(Error::Protocol)?;
            tracing::debug!(host = %self.host, "disconnected");
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn open_session(&mut self) -> Result<()> {
        Session::open_session(self).await
    }

    async fn request_pty(&mut self, size: PtySize) -> Result<()> {
        Session::request_pty(self, size).await
    }

    fn output_streams(&mut self) -> Result<OutputStreams> {
        Session::output_streams(self)
    }

    async fn start(&mut self, command: &str) -> Result<()> {
        Session::start(self, command).await
    }

    async fn wait(&mut self) -> Result<()> {
        Session::wait(self).await
    }

    async fn close(&mut self) -> Result<()> {
        Session::close(self).await
    }
}

/// Copy channel data into the output streams until the command finishes.
///
/// Dropping the sinks on return is what ends both streams.
async fn route_output(
    mut channel: Channel<Msg>,
    sinks: Option<Sinks>,
    early: Vec<ChannelMsg>,
) -> Result<u32> {
    let (mut stdout, mut stderr) = match sinks {
        Some(sinks) => (Some(sinks.stdout), Some(sinks.stderr)),
        None => (None, None),
    };

    let mut exit_status = None;
    let mut got_eof = false;
    let mut early = early.into_iter();

    loop {
        let msg = match early.next() {
            Some(msg) => msg,
            None => match channel.wait().await {
                Some(msg) => msg,
                None => break,
            },
        };
        match msg {
            ChannelMsg::Data { data } => forward(&mut stdout, &data).await,
            ChannelMsg::ExtendedData { data, ext: 1 } => forward(&mut stderr, &data).await,
            ChannelMsg::ExitStatus { exit_status: status } => {
                exit_status = Some(status);
                if got_eof {
                    break;
                }
            }
            ChannelMsg::Eof => {
                got_eof = true;
                if exit_status.is_some() {
                    break;
                }
            }
            ChannelMsg::Close | ChannelMsg::Failure => break,
            _ => {}
        }
    }

    let _ = channel.close().await;
    exit_status.ok_or(Error::ChannelClosed)
}

/// Read until the server answers a request sent with `want_reply`.
///
/// Anything else that arrives first is kept in `early`. None means the
/// channel went away without an answer.
async fn await_reply(channel: &mut Channel<Msg>, early: &mut Vec<ChannelMsg>) -> Option<bool> {
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Success => return Some(true),
            ChannelMsg::Failure => return Some(false),
            ChannelMsg::Close => return None,
            other => early.push(other),
        }
    }
    None
}

async fn forward(sink: &mut Option<DuplexStream>, data: &[u8]) {
    let failed = match sink {
        Some(pipe) => pipe.write_all(data).await.is_err(),
        None => false,
    };
    // Nobody is reading this stream any more; keep draining the channel.
    if failed {
        *sink = None;
    }
}
