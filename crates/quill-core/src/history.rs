use crate::action::RewriteAction;
use crate::error::Result;
use crate::storage::{load_json_or_default, save_json, update_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Maximum number of entries kept; older ones are dropped silently
pub const HISTORY_CAPACITY: usize = 50;

/// One completed rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub action: RewriteAction,
    pub original: String,
    pub modified: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        action: RewriteAction,
        original: impl Into<String>,
        modified: impl Into<String>,
    ) -> Self {
        Self {
            action,
            original: original.into(),
            modified: modified.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Newest-first ring of [`HistoryEntry`] values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Files written by hand may hold more than the cap
    fn enforce_capacity(mut self) -> Self {
        self.entries.truncate(HISTORY_CAPACITY);
        self
    }
}

enum Backing {
    File(PathBuf),
    Memory(Mutex<History>),
}

/// History shared by the daemon, the API server and the CLI.
///
/// The file-backed store re-reads the file on every call so separate
/// processes see each other's writes.
pub struct HistoryStore {
    backing: Backing,
}

impl HistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(History::default())),
        }
    }

    pub fn load(&self) -> Result<History> {
        match &self.backing {
            Backing::File(path) => {
                let history: History = load_json_or_default(path)?;
                Ok(history.enforce_capacity())
            }
            Backing::Memory(history) => Ok(lock(history).clone()),
        }
    }

    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.load()?.entries().cloned().collect())
    }

    pub fn record(&self, entry: HistoryEntry) -> Result<()> {
        debug!(action = %entry.action, "recording history entry");
        self.update(|history| history.push(entry))
    }

    pub fn clear(&self) -> Result<()> {
        self.update(History::clear)
    }

    /// Write the current entries as a JSON array to `path`
    pub fn export(&self, path: &Path) -> Result<usize> {
        let entries = self.entries()?;
        save_json(path, &entries)?;
        Ok(entries.len())
    }

    fn update(&self, change: impl FnOnce(&mut History)) -> Result<()> {
        match &self.backing {
            Backing::File(path) => update_json(path, change),
            Backing::Memory(history) => {
                change(&mut lock(history));
                Ok(())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> HistoryEntry {
        HistoryEntry::new(RewriteAction::Grammar, format!("in {}", n), format!("out {}", n))
    }

    #[test]
    fn keeps_the_fifty_most_recent_newest_first() {
        let store = HistoryStore::in_memory();
        for n in 0..55 {
            store.record(entry(n)).unwrap();
        }

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), HISTORY_CAPACITY);
        assert_eq!(entries[0].original, "in 54");
        assert_eq!(entries[49].original, "in 5");
    }

    #[test]
    fn serializes_action_as_type() {
        let value = serde_json::to_value(entry(1)).unwrap();
        assert_eq!(value["type"], "grammar");
        assert_eq!(value["original"], "in 1");
        assert_eq!(value["modified"], "out 1");
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn file_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        HistoryStore::open(&path).record(entry(1)).unwrap();
        HistoryStore::open(&path).record(entry(2)).unwrap();

        let entries = HistoryStore::open(&path).entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].original, "in 2");

        HistoryStore::open(&path).clear().unwrap();
        assert!(HistoryStore::open(&path).load().unwrap().is_empty());
    }

    #[test]
    fn writers_in_parallel_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let writers: Vec<_> = (0..2)
            .map(|w| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = HistoryStore::open(&path);
                    for n in 0..20 {
                        store.record(entry(w * 100 + n)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(HistoryStore::open(&path).entries().unwrap().len(), 40);
    }

    #[test]
    fn export_writes_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::in_memory();
        store.record(entry(7)).unwrap();

        let target = dir.path().join("export.json");
        assert_eq!(store.export(&target).unwrap(), 1);

        let exported: Vec<HistoryEntry> =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(exported[0].modified, "out 7");
    }
}
