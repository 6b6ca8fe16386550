//! JSON-file backed store.
//!
//! Records live in memory and the whole set is rewritten on every change.
//! Writes go to a temp file in the same directory and are renamed over the
//! target, so a crash leaves either the old or the new document.

use super::memory::MemoryDurableStore;
use super::{DurableStore, LikedIdsStream};
use crate::core::error::StoreError;
use crate::core::types::LikeRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LikesDocument {
    version: u32,
    records: Vec<LikeRecord>,
}

pub struct FileDurableStore {
    path: PathBuf,
    inner: MemoryDurableStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileDurableStore {
    /// Open the store at `path`, creating it on first write if missing.
    pub async fn open(path: impl Into<PathBuf>, watch_capacity: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let records = Self::read_records(&path).await?;
        info!(path = %path.display(), records = records.len(), "Opened like store");
        Ok(Self {
            path,
            inner: MemoryDurableStore::from_records(records, watch_capacity),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Read the records of a store file without opening it. A missing file
    /// reads as empty.
    pub async fn read_records(path: &Path) -> Result<Vec<LikeRecord>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let document: LikesDocument = serde_json::from_slice(&bytes)?;
                if document.version != FORMAT_VERSION {
                    return Err(StoreError::Storage(format!(
                        "unsupported store version {}",
                        document.version
                    )));
                }
                Ok(document.records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let document = LikesDocument {
            version: FORMAT_VERSION,
            records: self.inner.snapshot(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        let path = self.path.clone();
        let count = document.records.len();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Storage(format!("write task failed: {}", e)))??;

        debug!(path = %self.path.display(), records = count, "Persisted like store");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn all_like_records(&self) -> Result<Vec<LikeRecord>, StoreError> {
        self.inner.all_like_records().await
    }

    async fn like_record(&self, target_event_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        self.inner.like_record(target_event_id).await
    }

    async fn save_like_record(&self, record: &LikeRecord) -> Result<(), StoreError> {
        self.inner.save_like_record(record).await?;
        self.persist().await
    }

    async fn save_like_records_batch(&self, records: &[LikeRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.inner.save_like_records_batch(records).await?;
        self.persist().await
    }

    async fn delete_like_record(&self, target_event_id: &str) -> Result<bool, StoreError> {
        let existed = self.inner.delete_like_record(target_event_id).await?;
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.clear_all().await?;
        self.persist().await
    }

    fn watch_liked_event_ids(&self) -> LikedIdsStream {
        self.inner.watch_liked_event_ids()
    }

    fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_WATCH_CAPACITY;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("likes.json");

        {
            let store = FileDurableStore::open(&path, DEFAULT_WATCH_CAPACITY)
                .await
                .unwrap();
            store
                .save_like_records_batch(&[
                    LikeRecord::new("t1", "r1", 10),
                    LikeRecord::new("t2", "r2", 20),
                ])
                .await
                .unwrap();
            store.delete_like_record("t1").await.unwrap();
        }

        let store = FileDurableStore::open(&path, DEFAULT_WATCH_CAPACITY)
            .await
            .unwrap();
        assert_eq!(
            store.all_like_records().await.unwrap(),
            vec![LikeRecord::new("t2", "r2", 20)]
        );
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let records = FileDurableStore::read_records(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("likes.json");
        std::fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();

        let result = FileDurableStore::open(&path, DEFAULT_WATCH_CAPACITY).await;
        assert!(matches!(result, Err(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn test_clear_all_persists_empty_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("likes.json");
        let store = FileDurableStore::open(&path, DEFAULT_WATCH_CAPACITY)
            .await
            .unwrap();
        store
            .save_like_record(&LikeRecord::new("t1", "r1", 1))
            .await
            .unwrap();
        store.clear_all().await.unwrap();

        assert!(FileDurableStore::read_records(&path)
            .await
            .unwrap()
            .is_empty());
    }
}
