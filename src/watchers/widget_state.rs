//! Binds Escape to `wigo close all` while any widget is open.
//!
//! Widgets write a non-empty widget-state file when they open and empty it
//! when they close; the binding is toggled through the Hyprland control
//! socket.

use super::{touches, watch_dir};
use crate::daemon::supervisor::{Watcher, WatcherContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const BIND_ESCAPE: &str = "keyword bind ,escape,exec,wigo close all";
pub const UNBIND_ESCAPE: &str = "keyword unbind ,escape";

pub struct WidgetStateWatcher {
    state_path: PathBuf,
    hyprland_socket: PathBuf,
    bound: Mutex<Option<bool>>,
}

impl WidgetStateWatcher {
    pub fn new(state_path: impl Into<PathBuf>, hyprland_socket: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            hyprland_socket: hyprland_socket.into(),
            bound: Mutex::new(None),
        }
    }

    async fn sync(&self) {
        let open = widget_open(&self.state_path);
        let mut bound = self.bound.lock().await;
        if *bound == Some(open) {
            return;
        }

        let command = if open { BIND_ESCAPE } else { UNBIND_ESCAPE };
        match hyprctl(&self.hyprland_socket, command).await {
            Ok(()) => {
                debug!(open, "Escape binding updated");
                *bound = Some(open);
            }
            Err(e) => warn!("Unable to update escape binding: {:#}", e),
        }
    }
}

/// A widget is open when the state file exists and is non-empty.
pub fn widget_open(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

async fn hyprctl(socket: &Path, command: &str) -> Result<()> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("failed to connect to {}", socket.display()))?;
    stream.write_all(command.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[async_trait]
impl Watcher for WidgetStateWatcher {
    fn name(&self) -> &str {
        "widget-state"
    }

    async fn run(&self, ctx: WatcherContext) -> Result<()> {
        let dir = self
            .state_path
            .parent()
            .context("widget-state path has no parent")?;
        std::fs::create_dir_all(dir)?;

        let (_watcher, mut events) = watch_dir(dir)?;
        self.sync().await;

        loop {
            tokio::select! {
                _ = ctx.stop.stopped() => return Ok(()),
                event = events.recv() => match event {
                    Some(event) if touches(&event, &self.state_path) => self.sync().await,
                    Some(_) => {}
                    None => anyhow::bail!("widget-state watch channel closed"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[test]
    fn empty_or_missing_state_means_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wigo_widget_state");
        assert!(!widget_open(&path));

        std::fs::write(&path, "").unwrap();
        assert!(!widget_open(&path));

        std::fs::write(&path, "launcher").unwrap();
        assert!(widget_open(&path));
    }

    #[tokio::test]
    async fn sync_sends_bind_once_per_change() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("wigo_widget_state");
        let socket = dir.path().join("hypr.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let received = tokio::spawn(async move {
            let mut commands = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = String::new();
                stream.read_to_string(&mut buf).await.unwrap();
                commands.push(buf);
            }
            commands
        });

        let watcher = WidgetStateWatcher::new(&state, &socket);
        std::fs::write(&state, "launcher").unwrap();
        watcher.sync().await;
        watcher.sync().await;
        std::fs::write(&state, "").unwrap();
        watcher.sync().await;

        assert_eq!(
            received.await.unwrap(),
            vec![BIND_ESCAPE.to_string(), UNBIND_ESCAPE.to_string()]
        );
    }
}
