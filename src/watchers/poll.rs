use super::capture;
use crate::config::PollConfig;
use crate::daemon::supervisor::{Watcher, WatcherContext};
use crate::eww::WidgetSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a command every `interval_secs` and pushes its output.
pub struct PollWatcher {
    config: PollConfig,
    sink: Arc<dyn WidgetSink>,
}

impl PollWatcher {
    pub fn new(config: PollConfig, sink: Arc<dyn WidgetSink>) -> Self {
        Self { config, sink }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs).max(MIN_INTERVAL)
    }
}

#[async_trait]
impl Watcher for PollWatcher {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(&self, ctx: WatcherContext) -> Result<()> {
        let interval = self.interval();
        loop {
            match capture(&self.config.command).await {
                Ok(value) => self.sink.update(&self.config.variable, &value).await,
                Err(e) => warn!(watcher = %self.config.name, "Poll failed: {:#}", e),
            }

            tokio::select! {
                _ = ctx.stop.stopped() => return Ok(()),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
