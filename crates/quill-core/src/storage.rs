use crate::error::{QuillError, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

/// How long a writer waits for another process to finish its update
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// Lock files older than this belong to a writer that died mid-update
const STALE_LOCK: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(5);

/// Load a JSON document, falling back to `T::default()` when the file is
/// missing or empty.
pub fn load_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)?;

    // Handle empty files left behind by an interrupted write
    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content).map_err(|e| e.into())
}

/// Write a JSON document, creating the parent directory if needed.
///
/// The document is written to a temporary file next to `path` and renamed
/// over it, so readers see either the old or the new content in full.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Read, change and rewrite a JSON document while holding its lock file,
/// so concurrent writers in other processes never drop each other's changes.
pub fn update_json<T, R>(path: &Path, change: impl FnOnce(&mut T) -> R) -> Result<R>
where
    T: Serialize + DeserializeOwned + Default,
{
    let _lock = FileLock::acquire(path)?;
    let mut value: T = load_json_or_default(path)?;
    let result = change(&mut value);
    save_json(path, &value)?;
    Ok(result)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Exclusive `<file>.lock` marker, removed on drop
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn acquire(target: &Path) -> Result<Self> {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        fs::create_dir_all(parent_dir(&path))?;

        let started = SystemTime::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if started.elapsed().unwrap_or_default() > LOCK_TIMEOUT {
                        return Err(QuillError::Other(format!(
                            "Timed out waiting for {}",
                            path.display()
                        )));
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_is_stale(path: &Path) -> bool {
    File::open(path)
        .and_then(|file| file.metadata())
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map_or(false, |age| age > STALE_LOCK)
}

/// File name used for on-demand exports, e.g. `quill-history-2024-05-01.json`
pub fn export_file_name(kind: &str, date: NaiveDate) -> String {
    format!("quill-{}-{}.json", kind, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_and_empty_files_load_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing.json");
        let loaded: BTreeMap<String, u32> = load_json_or_default(&path).unwrap();
        assert!(loaded.is_empty());

        fs::write(&path, "  \n").unwrap();
        let loaded: BTreeMap<String, u32> = load_json_or_default(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let mut doc = BTreeMap::new();
        doc.insert("a".to_string(), 1u32);
        save_json(&path, &doc).unwrap();

        let loaded: BTreeMap<String, u32> = load_json_or_default(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn save_replaces_the_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{\"old\": 1, \"padding\": \"xxxxxxxxxxxxxxxxxxxxxxxx\"}").unwrap();

        let mut doc = BTreeMap::new();
        doc.insert("new".to_string(), 2u32);
        save_json(&path, &doc).unwrap();

        let loaded: BTreeMap<String, u32> = load_json_or_default(&path).unwrap();
        assert_eq!(loaded, doc);
        // Only the target is left behind, no temporary files
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn concurrent_updates_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        update_json(&path, |counts: &mut BTreeMap<String, u32>| {
                            *counts.entry("hits".to_string()).or_default() += 1;
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let counts: BTreeMap<String, u32> = load_json_or_default(&path).unwrap();
        assert_eq!(counts["hits"], 200);
        assert!(!dir.path().join("counter.json.lock").exists());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let lock = dir.path().join("doc.json.lock");
        fs::write(&lock, "4242").unwrap();
        let old = SystemTime::now() - Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&lock)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let value = update_json(&path, |n: &mut u32| {
            *n += 1;
            *n
        })
        .unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn export_names_carry_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name("stats", date), "quill-stats-2024-03-09.json");
    }
}
