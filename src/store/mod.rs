//! Durable key/value persistence facade for session fields.
//!
//! This module provides:
//! - `CredentialStore`: the storage trait (get/set/remove/clear), no logic
//! - `FileStore`: JSON-file-backed store with atomic writes
//! - `MemoryStore`: in-memory store for tests and ephemeral embedding

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// String-keyed durable storage abstracting the platform's key/value store.
///
/// Pure I/O; consistency rules (all-or-nothing snapshot writes) live in the
/// snapshot layer on top of this trait.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Remove every entry.
    fn clear(&self) -> anyhow::Result<()>;

    /// Write a batch of entries. Backends that can persist the batch in one
    /// durable write should override this.
    fn set_many(&self, entries: &[(String, String)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}
