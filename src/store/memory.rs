//! In-memory credential store for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::CredentialStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A poisoned lock only means a panic elsewhere; the map is still valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn set_many(&self, batch: &[(String, String)]) -> anyhow::Result<()> {
        let mut entries = self.lock();
        for (key, value) in batch {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
