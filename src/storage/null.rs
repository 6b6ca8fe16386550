use super::watch::LikedIdsBroadcast;
use super::{DurableStore, LikedIdsStream, DEFAULT_WATCH_CAPACITY};
use crate::core::error::StoreError;
use crate::core::types::LikeRecord;
use async_trait::async_trait;
use std::collections::HashSet;

/// Store used when nothing should be persisted. Keeps no records; its change
/// stream is fed by the repository's own mutations.
pub struct NullDurableStore {
    changes: LikedIdsBroadcast,
}

impl NullDurableStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WATCH_CAPACITY)
    }

    pub fn with_capacity(watch_capacity: usize) -> Self {
        Self {
            changes: LikedIdsBroadcast::new(watch_capacity),
        }
    }
}

impl Default for NullDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for NullDurableStore {
    async fn all_like_records(&self) -> Result<Vec<LikeRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn like_record(&self, _target_event_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        Ok(None)
    }

    async fn save_like_record(&self, _record: &LikeRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn save_like_records_batch(&self, _records: &[LikeRecord]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_like_record(&self, _target_event_id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn watch_liked_event_ids(&self) -> LikedIdsStream {
        self.changes.subscribe(None)
    }

    fn notify_liked_ids(&self, ids: &HashSet<String>) {
        self.changes.send(ids.clone());
    }

    fn close(&self) {
        self.changes.close();
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_keeps_nothing() {
        let store = NullDurableStore::new();
        store
            .save_like_record(&LikeRecord::new("t1", "r1", 1))
            .await
            .unwrap();
        assert!(store.all_like_records().await.unwrap().is_empty());
        assert!(store.like_record("t1").await.unwrap().is_none());
        assert!(!store.is_persistent());
    }

    #[tokio::test]
    async fn test_notify_feeds_watchers() {
        let store = NullDurableStore::new();
        let mut watch = store.watch_liked_event_ids();

        let ids = HashSet::from(["t1".to_string()]);
        store.notify_liked_ids(&ids);
        assert_eq!(watch.next().await, Some(ids));
    }

    #[tokio::test]
    async fn test_notify_after_close_is_noop() {
        let store = NullDurableStore::new();
        let mut watch = store.watch_liked_event_ids();
        store.close();
        store.notify_liked_ids(&HashSet::from(["t1".to_string()]));
        assert!(watch.next().await.is_none());
    }
}
