//! JSON-file-backed credential store with atomic writes.
//!
//! Entries are held in memory and flushed to disk as a single pretty-printed
//! JSON object on every mutation, so a multi-key write is one durable write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use tracing::warn;

use super::CredentialStore;

pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) a store at `path`.
    ///
    /// An unreadable or unparseable file is discarded and the store starts
    /// empty; the snapshot layer treats partial state as absent anyway.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }

        let entries = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                    Ok(map) => map,
                    Err(e) => {
                        warn!(error = %e, path = %path.display(), "discarding unparseable store file");
                        BTreeMap::new()
                    }
                },
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to read store file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, entries: Mutex::new(entries) })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Flush atomically (write tmp + rename).
    ///
    /// Uses a unique temp filename (PID + counter) to avoid corruption when
    /// concurrent saves race on the same `.tmp` file.
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let json = serde_json::to_string_pretty(entries)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.lock();
        entries.clear();
        self.flush(&entries)
    }

    fn set_many(&self, batch: &[(String, String)]) -> Result<()> {
        let mut entries = self.lock();
        for (key, value) in batch {
            entries.insert(key.clone(), value.clone());
        }
        // One durable write for the whole batch.
        self.flush(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileStore::open(&path).unwrap();
        store.set("authToken", "T1").unwrap();
        store
            .set_many(&[
                ("email".to_string(), "a@x.com".to_string()),
                ("role".to_string(), "CLIENT".to_string()),
            ])
            .unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("authToken").unwrap().as_deref(), Some("T1"));
        assert_eq!(reopened.get("email").unwrap().as_deref(), Some("a@x.com"));
        assert_eq!(reopened.get("missing").unwrap(), None);
    }

    #[test]
    fn test_clear_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileStore::open(&path).unwrap();
        store.set("authToken", "T1").unwrap();
        store.clear().unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("authToken").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("authToken").unwrap(), None);
    }
}
