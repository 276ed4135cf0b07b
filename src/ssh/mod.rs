// ABOUTME: SSH client module for remote command execution.
// ABOUTME: Supports key, password and agent authentication with known_hosts verification.

mod client;
mod error;
mod target;
mod transport;

pub use client::Session;
pub use error::{Error, Result};
pub use target::HostTarget;
pub use transport::{ByteStream, OutputStreams, PtySize, RemoteShell, SshTransport, Transport};
