//! Pushing state into the widget UI.
//!
//! Every watcher and the notification service publish through the
//! [`WidgetSink`] trait. The production sink shells out to `eww update`.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait WidgetSink: Send + Sync {
    /// Set a UI variable. Failures are logged, never returned: a missed
    /// update is repaired by the next one.
    async fn update(&self, variable: &str, value: &Value);
}

/// Runs `eww` subcommands.
pub struct EwwClient {
    binary: String,
}

impl EwwClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// `eww daemon --no-daemonize`, to be launched under the supervisor.
    pub fn daemon_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["daemon", "--no-daemonize"]);
        cmd
    }

    pub async fn open_many(&self, windows: &[String]) -> anyhow::Result<Output> {
        debug!(?windows, "Opening widgets");
        let output = Command::new(&self.binary)
            .arg("open-many")
            .args(windows)
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!(
                "eww open-many exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

/// Formats the `VAR=value` argument. Strings go through verbatim, everything
/// else as JSON.
pub fn update_argument(variable: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("{variable}={s}"),
        other => format!("{variable}={other}"),
    }
}

#[async_trait]
impl WidgetSink for EwwClient {
    async fn update(&self, variable: &str, value: &Value) {
        let arg = update_argument(variable, value);
        match Command::new(&self.binary).arg("update").arg(&arg).output().await {
            Ok(output) if output.status.success() => {
                debug!(variable, "eww variable updated");
            }
            Ok(output) => warn!(
                variable,
                code = ?output.status.code(),
                "eww update failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!(variable, "eww update error: {}", e),
        }
    }
}
