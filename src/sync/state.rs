use super::index::InMemoryIndex;
use crate::core::error::StoreError;
use crate::core::types::LikeRecord;
use crate::storage::DurableStore;
use std::sync::Arc;
use tracing::debug;

/// The in-memory index plus its write-through durable mirror.
///
/// Every mutation updates the index first, then the store, then notifies
/// liked-id watchers.
pub struct LocalLikes {
    index: InMemoryIndex,
    store: Arc<dyn DurableStore>,
}

impl LocalLikes {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            index: InMemoryIndex::new(),
            store,
        }
    }

    pub fn index(&self) -> &InMemoryIndex {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Merge every stored record into the index (newest wins).
    pub async fn load_from_store(&self) -> Result<usize, StoreError> {
        let records = self.store.all_like_records().await?;
        let mut applied = 0;
        for record in records {
            if self.index.upsert_if_newer(record) {
                applied += 1;
            }
        }
        self.notify();
        Ok(applied)
    }

    /// Index first, then the store for records not yet warmed into memory.
    pub async fn lookup(&self, target_event_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        if let Some(record) = self.index.get(target_event_id) {
            return Ok(Some(record));
        }
        if !self.store.is_persistent() {
            return Ok(None);
        }
        self.store.like_record(target_event_id).await
    }

    /// Insert or overwrite regardless of age. Used for the user's own likes
    /// and placeholder upgrades.
    /// The index is restored if the store write fails.
    pub async fn insert(&self, record: LikeRecord) -> Result<(), StoreError> {
        let previous = self.index.insert(record.clone());
        if let Err(e) = self.store.save_like_record(&record).await {
            self.restore(&record.target_event_id, previous);
            return Err(e);
        }
        self.notify();
        Ok(())
    }

    /// Apply only if strictly newer than the current record for the target.
    pub async fn apply_if_newer(&self, record: LikeRecord) -> Result<bool, StoreError> {
        let previous = self.index.get(&record.target_event_id);
        if !self.index.upsert_if_newer(record.clone()) {
            return Ok(false);
        }
        if let Err(e) = self.store.save_like_record(&record).await {
            self.restore(&record.target_event_id, previous);
            return Err(e);
        }
        self.notify();
        Ok(true)
    }

    /// Overwrite regardless of age and write them in one batch.
    pub async fn replace_batch(&self, records: Vec<LikeRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        for record in &records {
            self.index.insert(record.clone());
        }
        self.store.save_like_records_batch(&records).await?;
        self.notify();
        Ok(records.len())
    }

    /// Merge a batch with newest-wins and write the applied ones in one batch.
    pub async fn apply_batch_if_newer(
        &self,
        records: Vec<LikeRecord>,
    ) -> Result<Vec<LikeRecord>, StoreError> {
        let mut applied = Vec::new();
        for record in records {
            if self.index.upsert_if_newer(record.clone()) {
                applied.push(record);
            }
        }
        self.store.save_like_records_batch(&applied).await?;
        if !applied.is_empty() {
            self.notify();
        }
        Ok(applied)
    }

    /// The index entry is put back if the store delete fails.
    pub async fn remove(&self, target_event_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        let removed = self.index.remove(target_event_id);
        let existed_in_store = match self.store.delete_like_record(target_event_id).await {
            Ok(existed) => existed,
            Err(e) => {
                self.restore(target_event_id, removed);
                return Err(e);
            }
        };
        debug!(
            target_event_id,
            in_memory = removed.is_some(),
            in_store = existed_in_store,
            "Removed like record"
        );
        self.notify();
        Ok(removed)
    }

    /// Remove every record matching `predicate` from the index and the store.
    /// Records only present in the store are considered too.
    pub async fn remove_where<F>(&self, predicate: F) -> Result<Vec<LikeRecord>, StoreError>
    where
        F: Fn(&LikeRecord) -> bool,
    {
        let mut removed = self.index.remove_where(&predicate);
        for record in self.store.all_like_records().await? {
            let target = &record.target_event_id;
            if predicate(&record)
                && !self.index.is_liked(target)
                && !removed.iter().any(|r| &r.target_event_id == target)
            {
                removed.push(record);
            }
        }
        for record in &removed {
            self.store.delete_like_record(&record.target_event_id).await?;
        }
        if !removed.is_empty() {
            self.notify();
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.index.clear();
        self.store.clear_all().await?;
        self.notify();
        Ok(())
    }

    pub fn notify(&self) {
        self.store.notify_liked_ids(&self.index.liked_ids());
    }

    fn restore(&self, target_event_id: &str, previous: Option<LikeRecord>) {
        match previous {
            Some(record) => {
                self.index.insert(record);
            }
            None => {
                self.index.remove(target_event_id);
            }
        }
    }
}
