use super::capture;
use crate::config::SubscriptionConfig;
use crate::daemon::supervisor::{Watcher, WatcherContext};
use crate::eww::WidgetSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Follows a subscribe command (`pactl subscribe`, `nmcli monitor`, ...) and
/// refreshes a widget variable whenever a matching line appears.
pub struct SubscriptionWatcher {
    config: SubscriptionConfig,
    sink: Arc<dyn WidgetSink>,
}

impl SubscriptionWatcher {
    pub fn new(config: SubscriptionConfig, sink: Arc<dyn WidgetSink>) -> Self {
        Self { config, sink }
    }

    async fn refresh(&self) {
        match capture(&self.config.refresh).await {
            Ok(value) => self.sink.update(&self.config.variable, &value).await,
            Err(e) => warn!(watcher = %self.config.name, "Refresh failed: {:#}", e),
        }
    }
}

/// Empty filters match everything; otherwise any case-insensitive substring.
pub fn matches_filters(line: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let line = line.to_lowercase();
    filters.iter().any(|f| line.contains(&f.to_lowercase()))
}

#[async_trait]
impl Watcher for SubscriptionWatcher {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(&self, ctx: WatcherContext) -> Result<()> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .context("subscription has an empty command")?;

        self.refresh().await;

        let mut command = Command::new(program);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::null());
        let mut handle = ctx.supervisor.launch(&self.config.name, command).await?;
        let stdout = handle.stdout.take().context("subscribe stdout not captured")?;
        info!(watcher = %self.config.name, pid = ?handle.pid, "Subscribed");

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = ctx.stop.stopped() => return Ok(()),
                _ = handle.cancelled.stopped() => return Ok(()),
                line = lines.next_line() => match line? {
                    Some(line) if matches_filters(&line, &self.config.filters) => {
                        debug!(watcher = %self.config.name, line = %line, "Event");
                        self.refresh().await;
                    }
                    Some(_) => {}
                    None => anyhow::bail!("{} exited", program),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::supervisor::{ShutdownPolicy, Supervisor};
    use crate::eww::testing::RecordingSink;
    use serde_json::json;
    use std::time::Duration;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn filters_are_case_insensitive() {
        let filters = strings(&["sink", "Server"]);
        assert!(matches_filters("Event 'change' on SINK #57", &filters));
        assert!(matches_filters("Event 'change' on server #0", &filters));
        assert!(!matches_filters("Event 'new' on client #12", &filters));
        assert!(matches_filters("anything", &[]));
    }

    #[tokio::test]
    async fn matching_lines_trigger_refresh() {
        let sink = Arc::new(RecordingSink::default());
        let watcher = Arc::new(SubscriptionWatcher::new(
            SubscriptionConfig {
                name: "audio".into(),
                command: strings(&["sh", "-c", "echo 'change on sink'; echo 'new client'; sleep 30"]),
                filters: strings(&["sink"]),
                refresh: strings(&["echo", "{\"volume\": 40}"]),
                variable: "AUDIO_INFO".into(),
            },
            sink.clone(),
        ));

        let supervisor = Arc::new(Supervisor::new(ShutdownPolicy {
            restart_delay: Duration::from_millis(50),
            kill_grace: Duration::from_millis(10),
        }));
        supervisor.register_watcher(watcher).await;

        for _ in 0..100 {
            if sink.updates_for("AUDIO_INFO").len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        supervisor.stop_all().await;

        let updates = sink.updates_for("AUDIO_INFO");
        // Initial refresh plus one for the matching line.
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1], json!({"volume": 40}));
    }
}
