//! Supervised watchers that keep widget variables fresh.

pub mod config_watch;
pub mod poll;
pub mod subscription;
pub mod widget_state;

pub use config_watch::ConfigWatcher;
pub use poll::PollWatcher;
pub use subscription::SubscriptionWatcher;
pub use widget_state::WidgetStateWatcher;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use serde_json::Value;
use std::path::Path;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::warn;

/// Command output as a widget value: JSON when it parses, else the trimmed
/// text.
pub fn parse_output(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Runs `argv` to completion and parses its stdout.
pub async fn capture(argv: &[String]) -> Result<Value> {
    let (program, args) = argv.split_first().context("empty command")?;
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to run {program}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "{program} exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(parse_output(&output.stdout))
}

/// Watches `dir` non-recursively. Events arrive on the returned channel for
/// as long as the returned watcher is alive.
pub fn watch_dir(dir: &Path) -> Result<(RecommendedWatcher, mpsc::Receiver<notify::Event>)> {
    let (tx, rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = tx.blocking_send(event);
            }
            Err(e) => warn!("File watch error: {}", e),
        },
        notify::Config::default(),
    )
    .context("failed to create file watcher")?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    Ok((watcher, rx))
}

/// True if `event` changes `path`'s content or existence.
pub fn touches(event: &notify::Event, path: &Path) -> bool {
    matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
    ) && event.paths.iter().any(|p| p == path || p.file_name() == path.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_output_is_parsed() {
        assert_eq!(parse_output(b"{\"level\": 40}\n"), json!({"level": 40}));
        assert_eq!(parse_output(b"42"), json!(42));
    }

    #[test]
    fn plain_output_is_trimmed_text() {
        assert_eq!(parse_output(b"  Wired connection 1\n"), json!("Wired connection 1"));
    }

    #[tokio::test]
    async fn capture_rejects_empty_command() {
        assert!(capture(&[]).await.is_err());
    }

    #[tokio::test]
    async fn capture_reads_stdout() {
        let argv = vec!["echo".to_string(), "[1,2]".to_string()];
        assert_eq!(capture(&argv).await.unwrap(), json!([1, 2]));
    }

    #[test]
    fn touches_matches_kind_and_path() {
        let path = Path::new("/tmp/wigo/wigo_widget_state");
        let event = notify::Event::new(notify::EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(path.to_path_buf());
        assert!(touches(&event, path));

        let access = notify::Event::new(notify::EventKind::Access(notify::event::AccessKind::Any))
            .add_path(path.to_path_buf());
        assert!(!touches(&access, path));

        let other = notify::Event::new(notify::EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path("/tmp/wigo/other".into());
        assert!(!touches(&other, path));
    }
}
