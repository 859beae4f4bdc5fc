//! Notification history, one JSON object per line.
//!
//! Appends are O(1); removing a single entry rewrites the whole file.

use super::model::Notification;
use crate::error::Result;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, notification: &Notification) -> Result<()> {
        self.ensure_parent()?;
        let mut line = serde_json::to_vec(notification)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        trace!(id = notification.id, "History entry appended");
        Ok(())
    }

    /// All readable entries, newest ID first. Unparseable lines are skipped.
    pub fn load(&self) -> Vec<Notification> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read history: {}", e);
                return Vec::new();
            }
        };

        let mut history: Vec<Notification> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(notification) => Some(notification),
                Err(e) => {
                    warn!("Skipping malformed history line: {}", e);
                    None
                }
            })
            .collect();

        history.sort_by(|a, b| b.id.cmp(&a.id));
        history
    }

    /// Replaces the file content with `history`.
    pub fn rewrite(&self, history: &[Notification]) -> Result<()> {
        self.ensure_parent()?;
        let mut buf = Vec::new();
        for notification in history {
            serde_json::to_writer(&mut buf, notification)?;
            buf.push(b'\n');
        }
        fs::write(&self.path, buf)?;
        Ok(())
    }

    /// Drops every entry with `id`; returns what remains, newest first.
    pub fn remove(&self, id: u32) -> Result<Vec<Notification>> {
        let mut history = self.load();
        history.retain(|n| n.id != id);
        self.rewrite(&history)?;
        Ok(history)
    }

    /// Truncates the log.
    pub fn clear(&self) -> Result<()> {
        self.ensure_parent()?;
        fs::write(&self.path, b"")?;
        Ok(())
    }

    /// Number of non-empty lines.
    pub fn count(&self) -> usize {
        fs::read_to_string(&self.path)
            .map(|content| content.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::model::{HintValue, Hints};

    fn sample(id: u32) -> Notification {
        let mut hints = Hints::new();
        hints.insert("urgency".into(), HintValue::Int(1));
        hints.insert("category".into(), HintValue::Str("email".into()));
        Notification {
            id,
            app_name: "mail-client".into(),
            replaces_id: 0,
            app_icon: "mail-unread".into(),
            summary: format!("Mail {id}"),
            body: "You have mail".into(),
            actions: vec!["default".into(), "Open".into()],
            hints,
            expire_timeout: 10_000,
            timestamp: 1_700_000_000,
        }
    }

    fn store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("wigo").join("history.jsonl"));
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load().is_empty());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn append_then_count() {
        let (_dir, store) = store();
        for id in 1..=5 {
            store.append(&sample(id)).unwrap();
        }
        assert_eq!(store.count(), 5);
    }

    #[test]
    fn clear_resets_count() {
        let (_dir, store) = store();
        store.append(&sample(1)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_sorts_newest_id_first_and_keeps_every_field() {
        let (_dir, store) = store();
        store.append(&sample(3)).unwrap();
        store.append(&sample(9)).unwrap();
        store.append(&sample(5)).unwrap();

        let history = store.load();
        let ids: Vec<u32> = history.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![9, 5, 3]);
        assert_eq!(history[0], sample(9));
    }

    #[test]
    fn remove_rewrites_without_entry() {
        let (_dir, store) = store();
        for id in [1, 2, 3] {
            store.append(&sample(id)).unwrap();
        }
        let remaining = store.remove(2).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(store.count(), 2);
        assert!(store.load().iter().all(|n| n.id != 2));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (_dir, store) = store();
        store.append(&sample(1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        assert_eq!(store.load().len(), 1);
    }
}
