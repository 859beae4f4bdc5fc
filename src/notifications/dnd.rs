use crate::error::Result;
use std::fs;
use std::path::PathBuf;

const ON: &str = "on";
const OFF: &str = "off";

/// Persisted Do-Not-Disturb flag, stored as the literal `on` or `off`.
pub struct DndStore {
    path: PathBuf,
}

impl DndStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing or unreadable state counts as off.
    pub fn get(&self) -> bool {
        fs::read_to_string(&self.path)
            .map(|s| s.trim() == ON)
            .unwrap_or(false)
    }

    pub fn set(&self, on: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, if on { ON } else { OFF })?;
        tracing::debug!(on, "Do-not-disturb updated");
        Ok(())
    }

    /// Flips the flag and returns the new state.
    pub fn toggle(&self) -> Result<bool> {
        let next = !self.get();
        self.set(next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_off() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!DndStore::new(dir.path().join("dnd")).get());
    }

    #[test]
    fn set_persists_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("dnd");
        let store = DndStore::new(&path);
        store.set(true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "on");
        assert!(store.get());
    }

    #[test]
    fn toggle_flips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DndStore::new(dir.path().join("dnd"));
        assert!(store.toggle().unwrap());
        assert!(!store.toggle().unwrap());
        assert!(!store.get());
    }
}
