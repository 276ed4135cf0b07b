// ABOUTME: Test support utilities.
// ABOUTME: Provides an in-memory transport that emulates hosts running the grep pipeline.

pub mod ssh_server;

use async_trait::async_trait;
use remote_grep::ssh::{Error, HostTarget, OutputStreams, PtySize, RemoteShell, Result, Transport};
use remote_grep::stream::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("remote_grep=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// How a fake host behaves.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum FakeHost {
    /// Connection is refused.
    Unreachable,
    /// Connects, but the PTY request fails.
    PtyRefused,
    /// The transport panics while connecting.
    Panics,
    /// Runs the command cleanly, but reading its stdout panics.
    StdoutPanics,
    /// Serves a log file; the command's grep stages run against it.
    Log {
        file: String,
        lines: Vec<String>,
        stderr: Vec<String>,
        exit_status: u32,
    },
}

#[allow(dead_code)]
impl FakeHost {
    pub fn log(file: &str, lines: &[&str]) -> Self {
        FakeHost::Log {
            file: file.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
            stderr: Vec::new(),
            exit_status: 0,
        }
    }
}

/// In-memory transport keyed by host name.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeTransport {
    hosts: HashMap<String, FakeHost>,
    connect_delay: Option<Duration>,
    pub stats: Arc<Stats>,
}

#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct Stats {
    pub connects: AtomicUsize,
    pub active_connects: AtomicUsize,
    pub peak_connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, name: &str, host: FakeHost) -> Self {
        self.hosts.insert(name.to_string(), host);
        self
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn RemoteShell>> {
        let active = self.stats.active_connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_connects.fetch_max(active, Ordering::SeqCst);
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        self.stats.active_connects.fetch_sub(1, Ordering::SeqCst);

        let behaviour = self
            .hosts
            .get(&target.host)
            .cloned()
            .unwrap_or(FakeHost::Unreachable);

        match behaviour {
            FakeHost::Unreachable => Err(Error::Connection(format!(
                "connection refused to {}:{}",
                target.host, target.port
            ))),
            FakeHost::Panics => panic!("transport exploded for {}", target.host),
            behaviour => Ok(Box::new(FakeShell {
                behaviour,
                stats: Arc::clone(&self.stats),
                sinks: None,
                runner: None,
                closed: false,
            })),
        }
    }
}

struct FakeShell {
    behaviour: FakeHost,
    stats: Arc<Stats>,
    sinks: Option<(DuplexStream, DuplexStream)>,
    runner: Option<JoinHandle<u32>>,
    closed: bool,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn open_session(&mut self) -> Result<()> {
        Ok(())
    }

    async fn request_pty(&mut self, size: PtySize) -> Result<()> {
        assert_eq!(size, PtySize { cols: 80, rows: 40 });
        match self.behaviour {
            FakeHost::PtyRefused => Err(Error::SessionFailed("pty refused".to_string())),
            _ => Ok(()),
        }
    }

    fn output_streams(&mut self) -> Result<OutputStreams> {
        let (stdout_sink, stdout) = tokio::io::duplex(64);
        let (stderr_sink, stderr) = tokio::io::duplex(64);
        self.sinks = Some((stdout_sink, stderr_sink));
        if matches!(self.behaviour, FakeHost::StdoutPanics) {
            return Ok(OutputStreams {
                stdout: Box::new(PanickingReader),
                stderr: Box::new(stderr),
            });
        }
        Ok(OutputStreams {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }

    async fn start(&mut self, command: &str) -> Result<()> {
        self.stats.commands.lock().unwrap().push(command.to_string());

        if matches!(self.behaviour, FakeHost::StdoutPanics) {
            // Dropping the sinks ends stderr; stdout never reads from them.
            self.sinks = None;
            self.runner = Some(tokio::spawn(async { 0 }));
            return Ok(());
        }

        let FakeHost::Log {
            file,
            lines,
            stderr,
            exit_status,
        } = self.behaviour.clone()
        else {
            return Err(Error::CommandFailed("host cannot run commands".to_string()));
        };
        let (mut out, mut err) = self.sinks.take().ok_or(Error::NotStarted)?;

        let patterns = grep_patterns(command);
        let matched: Vec<String> = lines
            .into_iter()
            .filter(|line| patterns.iter().all(|p| line.contains(p.as_str())))
            .collect();

        self.runner = Some(tokio::spawn(async move {
            // Noise the presenter is expected to drop.
            let _ = out.write_all(format!("==> {file} <==\r\n").as_bytes()).await;
            let _ = out.write_all(b"\r\n").await;
            for line in matched {
                let _ = out.write_all(format!("{line}\r\n").as_bytes()).await;
            }
            for line in stderr {
                let _ = err.write_all(format!("{line}\n").as_bytes()).await;
            }
            exit_status
        }));
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        let runner = self.runner.take().ok_or(Error::NotStarted)?;
        match runner.await {
            Ok(0) => Ok(()),
            Ok(code) => Err(Error::ExitStatus(code)),
            Err(e) => Err(Error::CommandFailed(e.to_string())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.sinks = None;
        if let Some(runner) = self.runner.take() {
            runner.abort();
        }
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Output stream whose first read panics.
struct PanickingReader;

impl AsyncRead for PanickingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        panic!("stdout reader exploded")
    }
}

/// Quoted grep patterns of a pipeline, with bracket escapes undone.
fn grep_patterns(command: &str) -> Vec<String> {
    command
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(|p| p.replace("\\[", "[").replace("\\]", "]"))
        .collect()
}

/// Receive everything until the channel closes.
#[allow(dead_code)]
pub async fn collect(mut rx: mpsc::Receiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }
    messages
}
