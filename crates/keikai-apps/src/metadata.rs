//! Persistent per-launchable metadata (usage, last launch, pin).
//!
//! Records are keyed by [`Identity::key`](crate::Identity::key). A record at
//! default values is removed rather than stored.

use crate::error::StoreError;
use crate::paths::get_metadata_path;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted fields of one launchable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchMetadata {
    /// Seconds since epoch, 0 if never launched.
    #[serde(default)]
    pub last_launch: i64,
    #[serde(default)]
    pub usage_count: u32,
    /// 0 = unpinned.
    #[serde(default)]
    pub priority: u32,
}

impl LaunchMetadata {
    /// No pin and no usage. The launch time alone is not worth keeping.
    pub fn is_default(&self) -> bool {
        self.priority == 0 && self.usage_count == 0
    }

    /// The form that gets stored: launch time only travels with usage.
    fn normalized(mut self) -> Self {
        if self.usage_count == 0 {
            self.last_launch = 0;
        }
        self
    }
}

/// Durable key-value store for [`LaunchMetadata`].
///
/// Implementations serialize their own access.
pub trait MetadataStore: Send + Sync {
    /// Stored metadata, or defaults when absent.
    fn get(&self, key: &str) -> LaunchMetadata;

    /// Upsert, or delete when `metadata` is at defaults.
    fn put(&self, key: &str, metadata: LaunchMetadata) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<HashMap<String, LaunchMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, key: &str) -> LaunchMetadata {
        self.records.lock().get(key).copied().unwrap_or_default()
    }

    fn put(&self, key: &str, metadata: LaunchMetadata) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if metadata.is_default() {
            records.remove(key);
        } else {
            records.insert(key.to_string(), metadata.normalized());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.lock().remove(key);
        Ok(())
    }
}

/// JSON file store, written through on every change.
/// Typically stored in ~/.local/share/keikai/launch_metadata.json
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    records: Mutex<HashMap<String, LaunchMetadata>>,
}

impl JsonMetadataStore {
    /// Open the store at the default data location.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(get_metadata_path())
    }

    /// Open (or start empty) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        info!(
            "Loaded {} launch records from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &HashMap<String, LaunchMetadata>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    fn get(&self, key: &str) -> LaunchMetadata {
        self.records.lock().get(key).copied().unwrap_or_default()
    }

    fn put(&self, key: &str, metadata: LaunchMetadata) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if metadata.is_default() {
            if records.remove(key).is_none() {
                return Ok(());
            }
            debug!("Deleting launch record {}", key);
        } else {
            records.insert(key.to_string(), metadata.normalized());
        }
        self.persist(&records)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if records.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&records).inspect_err(|e| {
            warn!("Failed to persist deletion of {}: {}", key, e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn used(count: u32) -> LaunchMetadata {
        LaunchMetadata {
            last_launch: 1_700_000_000,
            usage_count: count,
            priority: 0,
        }
    }

    #[test]
    fn absent_key_yields_defaults() {
        let store = MemoryMetadataStore::new();
        assert_eq!(store.get("missing"), LaunchMetadata::default());
    }

    #[test]
    fn default_metadata_deletes_record() {
        let store = MemoryMetadataStore::new();
        store.put("a", used(3)).unwrap();
        assert_eq!(store.len(), 1);

        store.put("a", LaunchMetadata::default()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn launch_time_without_usage_is_not_kept() {
        let store = MemoryMetadataStore::new();
        store
            .put(
                "pinned",
                LaunchMetadata {
                    last_launch: 42,
                    usage_count: 0,
                    priority: 1,
                },
            )
            .unwrap();

        assert_eq!(
            store.get("pinned"),
            LaunchMetadata {
                last_launch: 0,
                usage_count: 0,
                priority: 1,
            }
        );
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("launch_metadata.json");

        {
            let store = JsonMetadataStore::open(&path).unwrap();
            store.put("org.example/org.example", used(5)).unwrap();
            store.put("other/other", used(1)).unwrap();
            store.delete("other/other").unwrap();
        }

        let reopened = JsonMetadataStore::open(&path).unwrap();
        assert_eq!(reopened.get("org.example/org.example"), used(5));
        assert_eq!(reopened.get("other/other"), LaunchMetadata::default());
    }

    #[test]
    fn json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launch_metadata.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonMetadataStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }
}
