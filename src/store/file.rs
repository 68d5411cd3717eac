//! YAML snapshot store
//!
//! Keeps the keyspace in memory and rewrites a YAML snapshot after every
//! write, so persisted mute deadlines survive a restart.

use super::{KeyValueStore, MemoryStore};
use crate::error::PaladinResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File-backed store
pub struct YamlFileStore {
    path: PathBuf,
    values: MemoryStore,
    // held across a change and its snapshot so writes land on disk in order
    write_lock: Mutex<()>,
}

impl YamlFileStore {
    /// Open the store at `path`, loading the existing snapshot if present
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn open(path: impl AsRef<Path>) -> PaladinResult<Self> {
        let path = path.as_ref().to_path_buf();

        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                let entries: BTreeMap<String, String> = serde_yaml::from_str(&content)?;
                info!("Loaded {} keys from {}", entries.len(), path.display());
                MemoryStore::from_entries(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key, value.into_bytes())),
                )
            }
            Ok(_) => MemoryStore::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store snapshot at {}, starting empty", path.display());
                MemoryStore::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the snapshot file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to `key` and write the snapshot. If the snapshot cannot
    /// be written the key is put back as it was.
    async fn write_through<T>(
        &self,
        key: &str,
        change: impl FnOnce(&MemoryStore) -> T,
    ) -> PaladinResult<T> {
        let _guard = self.write_lock.lock().await;
        let previous = self.values.get_sync(key);
        let output = change(&self.values);
        if let Err(e) = self.persist().await {
            self.values.restore(key, previous);
            warn!("Snapshot write failed, reverted {key}: {e}");
            return Err(e);
        }
        Ok(output)
    }

    async fn persist(&self) -> PaladinResult<()> {
        let entries: BTreeMap<String, String> = self
            .values
            .snapshot()
            .into_iter()
            .map(|(key, value)| (key, String::from_utf8_lossy(&value).into_owned()))
            .collect();
        let yaml = serde_yaml::to_string(&entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp_path, yaml).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Wrote {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for YamlFileStore {
    async fn get(&self, key: &str) -> PaladinResult<Option<Vec<u8>>> {
        self.values.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> PaladinResult<()> {
        self.write_through(key, |values| values.restore(key, Some(value)))
            .await
    }

    async fn keys(&self, pattern: &str) -> PaladinResult<Vec<String>> {
        self.values.keys(pattern).await
    }

    async fn incr(&self, key: &str) -> PaladinResult<u64> {
        self.write_through(key, |values| values.incr_sync(key)).await
    }
}
