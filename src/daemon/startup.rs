use super::server::Startup;
use super::supervisor::Supervisor;
use crate::clienv;
use crate::config::Config;
use crate::eww::{EwwClient, WidgetSink};
use crate::notifications::NotificationService;
use crate::watchers::{config_watch, ConfigWatcher, PollWatcher, SubscriptionWatcher, WidgetStateWatcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Time given to the eww daemon before widgets are opened
const EWW_SETTLE: Duration = Duration::from_millis(500);

/// The desktop startup sequence: eww daemon, watchers, widgets.
pub struct WidgetStartup {
    config_path: PathBuf,
    eww: Arc<EwwClient>,
    notifications: Option<Arc<NotificationService>>,
}

impl WidgetStartup {
    pub fn new(config_path: impl Into<PathBuf>, eww: Arc<EwwClient>) -> Self {
        Self {
            config_path: config_path.into(),
            eww,
            notifications: None,
        }
    }

    /// Pushes the stored notification history once the UI is up.
    pub fn with_notifications(mut self, service: Arc<NotificationService>) -> Self {
        self.notifications = Some(service);
        self
    }
}

#[async_trait]
impl Startup for WidgetStartup {
    async fn start(&self, supervisor: &Arc<Supervisor>) -> Result<()> {
        let config = Config::load_or_default(&self.config_path)
            .with_context(|| format!("failed to load {}", self.config_path.display()))?;
        let sink: Arc<dyn WidgetSink> = self.eww.clone();

        if config.eww.launch_daemon {
            let handle = supervisor
                .launch("eww-daemon", self.eww.daemon_command())
                .await?;
            info!(pid = ?handle.pid, "eww daemon launched");
            tokio::time::sleep(EWW_SETTLE).await;
        }

        config_watch::push_config(sink.as_ref(), &config).await;
        if let Some(service) = &self.notifications {
            service.push_history().await;
        }
        supervisor
            .register_watcher(Arc::new(ConfigWatcher::new(&self.config_path, sink.clone())))
            .await;

        match clienv::hyprland_socket_path() {
            Some(socket) => {
                supervisor
                    .register_watcher(Arc::new(WidgetStateWatcher::new(
                        clienv::widget_state_path(),
                        socket,
                    )))
                    .await;
            }
            None => info!("Not running under Hyprland, escape binding disabled"),
        }

        for subscription in &config.subscriptions {
            supervisor
                .register_watcher(Arc::new(SubscriptionWatcher::new(
                    subscription.clone(),
                    sink.clone(),
                )))
                .await;
        }
        for poll in &config.polls {
            supervisor
                .register_watcher(Arc::new(PollWatcher::new(poll.clone(), sink.clone())))
                .await;
        }

        if !config.eww.windows.is_empty() {
            if let Err(e) = self.eww.open_many(&config.eww.windows).await {
                warn!("Failed to open widgets: {:#}", e);
            }
        }

        info!(
            subscriptions = config.subscriptions.len(),
            polls = config.polls.len(),
            "Startup sequence complete"
        );
        Ok(())
    }
}
