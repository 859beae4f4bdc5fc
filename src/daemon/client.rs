use super::protocol::{Reply, Request};
use crate::clienv;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::trace;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(500);

/// Talks to a running daemon over its control socket.
pub struct DaemonClient {
    socket_path: PathBuf,
    dial_timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonClient {
    pub fn new() -> Self {
        Self::with_socket(clienv::socket_path())
    }

    pub fn with_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Bound on the dial and on waiting for the reply.
    pub fn timeout(&self) -> Duration {
        self.dial_timeout
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// `STATUS` answered with `OK:`.
    pub async fn is_running(&self) -> bool {
        matches!(self.send(&Request::Status).await, Ok(reply) if reply.is_ok())
    }

    pub async fn send(&self, request: &Request) -> Result<Reply> {
        self.send_raw(&request.to_string()).await
    }

    /// Writes one command and reads the reply until the daemon closes the
    /// connection. A failed dial, or a daemon that does not answer within
    /// the dial timeout, maps to [`Error::DaemonNotRunning`].
    pub async fn send_raw(&self, command: &str) -> Result<Reply> {
        let mut stream = self.dial().await?;
        trace!(command, "Sending control command");

        let raw = tokio::time::timeout(self.dial_timeout, exchange(&mut stream, command))
            .await
            .map_err(|_| {
                Error::DaemonNotRunning(format!(
                    "{}: no reply within {:?}",
                    self.socket_path.display(),
                    self.dial_timeout
                ))
            })??;
        trace!(reply = %raw, "Control reply received");
        Ok(Reply::parse(&raw))
    }

    async fn dial(&self) -> Result<UnixStream> {
        match tokio::time::timeout(self.dial_timeout, UnixStream::connect(&self.socket_path)).await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Error::DaemonNotRunning(format!(
                "{}: {}",
                self.socket_path.display(),
                e
            ))),
            Err(_) => Err(Error::DaemonNotRunning(format!(
                "{}: dial timed out after {:?}",
                self.socket_path.display(),
                self.dial_timeout
            ))),
        }
    }
}

async fn exchange(stream: &mut UnixStream, command: &str) -> Result<String> {
    stream.write_all(command.as_bytes()).await?;
    stream.flush().await?;

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await?;
    Ok(raw)
}
