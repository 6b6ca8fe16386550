use super::watch::LikedIdsBroadcast;
use super::{DurableStore, LikedIdsStream, DEFAULT_WATCH_CAPACITY};
use crate::core::error::StoreError;
use crate::core::types::LikeRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// In-process store. Emits a liked-ids snapshot after every change.
pub struct MemoryDurableStore {
    records: RwLock<HashMap<String, LikeRecord>>,
    changes: LikedIdsBroadcast,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WATCH_CAPACITY)
    }

    pub fn with_capacity(watch_capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            changes: LikedIdsBroadcast::new(watch_capacity),
        }
    }

    pub fn from_records(records: Vec<LikeRecord>, watch_capacity: usize) -> Self {
        let store = Self::with_capacity(watch_capacity);
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.target_event_id.clone(), record);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All records, newest first.
    pub fn snapshot(&self) -> Vec<LikeRecord> {
        let mut records: Vec<LikeRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.target_event_id.cmp(&b.target_event_id))
        });
        records
    }

    fn liked_ids(&self) -> HashSet<String> {
        self.records.read().keys().cloned().collect()
    }

    fn emit(&self) {
        self.changes.send(self.liked_ids());
    }
}

impl Default for MemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn all_like_records(&self) -> Result<Vec<LikeRecord>, StoreError> {
        Ok(self.snapshot())
    }

    async fn like_record(&self, target_event_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        Ok(self.records.read().get(target_event_id).cloned())
    }

    async fn save_like_record(&self, record: &LikeRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(record.target_event_id.clone(), record.clone());
        self.emit();
        Ok(())
    }

    async fn save_like_records_batch(&self, records: &[LikeRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        {
            let mut map = self.records.write();
            for record in records {
                map.insert(record.target_event_id.clone(), record.clone());
            }
        }
        self.emit();
        Ok(())
    }

    async fn delete_like_record(&self, target_event_id: &str) -> Result<bool, StoreError> {
        let existed = self.records.write().remove(target_event_id).is_some();
        if existed {
            self.emit();
        }
        Ok(existed)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.records.write().clear();
        self.emit();
        Ok(())
    }

    fn watch_liked_event_ids(&self) -> LikedIdsStream {
        self.changes.subscribe(Some(self.liked_ids()))
    }

    fn close(&self) {
        self.changes.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_save_get_delete() {
        let store = MemoryDurableStore::new();
        store
            .save_like_record(&LikeRecord::new("t1", "r1", 1))
            .await
            .unwrap();

        assert_eq!(
            store.like_record("t1").await.unwrap(),
            Some(LikeRecord::new("t1", "r1", 1))
        );
        assert!(store.delete_like_record("t1").await.unwrap());
        assert!(!store.delete_like_record("t1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_by_target() {
        let store = MemoryDurableStore::new();
        store
            .save_like_records_batch(&[
                LikeRecord::new("t1", "pending_like_1", 1),
                LikeRecord::new("t2", "r2", 2),
            ])
            .await
            .unwrap();
        store
            .save_like_record(&LikeRecord::new("t1", "r1", 3))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let all = store.all_like_records().await.unwrap();
        assert_eq!(all[0], LikeRecord::new("t1", "r1", 3));
    }

    #[tokio::test]
    async fn test_watch_emits_current_then_changes() {
        let store = MemoryDurableStore::new();
        store
            .save_like_record(&LikeRecord::new("t1", "r1", 1))
            .await
            .unwrap();

        let mut watch = store.watch_liked_event_ids();
        assert_eq!(
            watch.next().await,
            Some(HashSet::from(["t1".to_string()]))
        );

        store.delete_like_record("t1").await.unwrap();
        assert_eq!(watch.next().await, Some(HashSet::new()));
    }

    #[tokio::test]
    async fn test_clear_after_close_does_not_fail() {
        let store = MemoryDurableStore::new();
        store.close();
        store.clear_all().await.unwrap();
        assert!(store.watch_liked_event_ids().next().await.is_none());
    }
}
