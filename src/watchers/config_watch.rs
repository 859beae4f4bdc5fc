use super::{touches, watch_dir};
use crate::config::Config;
use crate::daemon::supervisor::{Watcher, WatcherContext};
use crate::eww::WidgetSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const APPS_VARIABLE: &str = "APPS_CONFIG";
pub const GENERAL_VARIABLE: &str = "GENERAL_CONFIG";

/// Pushes the `apps` and `general` tables whenever the config file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    sink: Arc<dyn WidgetSink>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, sink: Arc<dyn WidgetSink>) -> Self {
        Self {
            path: path.into(),
            sink,
        }
    }

    async fn reload(&self) {
        match Config::load_or_default(&self.path) {
            Ok(config) => push_config(self.sink.as_ref(), &config).await,
            Err(e) => warn!(path = %self.path.display(), "Config reload failed: {}", e),
        }
    }
}

/// Sends the UI-facing tables of `config`. Absent tables are skipped.
pub async fn push_config(sink: &dyn WidgetSink, config: &Config) {
    for (variable, table) in [(APPS_VARIABLE, &config.apps), (GENERAL_VARIABLE, &config.general)] {
        let Some(table) = table else { continue };
        match serde_json::to_value(table) {
            Ok(value) => sink.update(variable, &value).await,
            Err(e) => warn!(variable, "Failed to convert config table: {}", e),
        }
    }
}

#[async_trait]
impl Watcher for ConfigWatcher {
    fn name(&self) -> &str {
        "config"
    }

    async fn run(&self, ctx: WatcherContext) -> Result<()> {
        let dir = self.path.parent().context("config path has no parent")?;
        std::fs::create_dir_all(dir)?;
        let (_watcher, mut events) = watch_dir(dir)?;
        info!(path = %self.path.display(), "Watching config");

        loop {
            tokio::select! {
                _ = ctx.stop.stopped() => return Ok(()),
                event = events.recv() => match event {
                    Some(event) if touches(&event, &self.path) => {
                        info!("Config changed, reloading");
                        self.reload().await;
                    }
                    Some(_) => {}
                    None => anyhow::bail!("config watch channel closed"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eww::testing::RecordingSink;
    use serde_json::json;

    #[tokio::test]
    async fn pushes_only_present_tables() {
        let sink = RecordingSink::default();
        let config: Config = toml::from_str(
            r#"
            [general]
            profile_pic = "~/me.png"
            "#,
        )
        .unwrap();

        push_config(&sink, &config).await;
        assert!(sink.updates_for(APPS_VARIABLE).is_empty());
        assert_eq!(
            sink.last(GENERAL_VARIABLE),
            Some(json!({"profile_pic": "~/me.png"}))
        );
    }

    #[tokio::test]
    async fn reload_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[apps]\nterminal = \"foot\"\n").unwrap();

        let sink = Arc::new(RecordingSink::default());
        ConfigWatcher::new(&path, sink.clone()).reload().await;
        assert_eq!(sink.last(APPS_VARIABLE), Some(json!({"terminal": "foot"})));
    }
}
