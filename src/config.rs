use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_RESTART_DELAY_MS: u64 = 2_000;
pub const DEFAULT_KILL_GRACE_MS: u64 = 50;
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_EWW_BINARY: &str = "eww";

/// Root configuration. Every field has a default so a missing or partial
/// file still yields a runnable daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub eww: EwwConfig,
    pub supervisor: SupervisorConfig,
    pub socket: SocketConfig,
    pub notifications: NotificationConfig,
    pub subscriptions: Vec<SubscriptionConfig>,
    pub polls: Vec<PollConfig>,
    /// Forwarded to the UI as `APPS_CONFIG`.
    pub apps: Option<toml::Value>,
    /// Forwarded to the UI as `GENERAL_CONFIG`.
    pub general: Option<toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EwwConfig {
    pub binary: String,
    /// Launch `eww daemon --no-daemonize` as a tracked process on startup
    pub launch_daemon: bool,
    /// Windows opened with `eww open-many` once watchers are running
    pub windows: Vec<String>,
}

impl Default for EwwConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_EWW_BINARY.to_string(),
            launch_daemon: true,
            windows: ["bar", "wallpaper", "clock", "notification-view", "osd"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub restart_delay_ms: u64,
    pub kill_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub dial_timeout_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT_MS,
        }
    }
}

impl SocketConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Claim org.freedesktop.Notifications in the daemon
    pub enabled: bool,
    /// Command run for every new notification, with `NOTIFICATION=<json>` set
    pub exec: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exec: Vec::new(),
        }
    }
}

/// A long-running subscribe command whose output lines trigger a refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionConfig {
    pub name: String,
    /// e.g. `["pactl", "subscribe"]`
    pub command: Vec<String>,
    /// Lines containing any of these (case-insensitive) trigger a refresh.
    /// Empty means every line does.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Command whose stdout is pushed to `variable`
    pub refresh: Vec<String>,
    pub variable: String,
}

/// A command run on a fixed interval, its stdout pushed to `variable`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    pub name: String,
    pub command: Vec<String>,
    pub variable: String,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

impl Config {
    /// Loads `path`, returning defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        tracing::trace!(
            subscriptions = config.subscriptions.len(),
            polls = config.polls.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Rejects watchers that could never run.
    pub fn validate(&self) -> Result<()> {
        for sub in &self.subscriptions {
            if sub.command.is_empty() || sub.refresh.is_empty() {
                return Err(Error::Config(format!(
                    "subscription '{}' needs both command and refresh",
                    sub.name
                )));
            }
        }
        for poll in &self.polls {
            if poll.command.is_empty() {
                return Err(Error::Config(format!("poll '{}' has no command", poll.name)));
            }
        }
        Ok(())
    }

    /// Loads the config at the resolved default path.
    pub fn load() -> Result<Self> {
        Self::load_or_default(&crate::clienv::config_path())
    }
}
