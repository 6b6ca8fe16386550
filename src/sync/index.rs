use crate::core::types::LikeRecord;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Authoritative runtime copy of the like state, keyed by target event id.
///
/// Entries keep their first insertion position so that ordering ties on
/// `created_at` resolve stably.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<IndexMap<String, LikeRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_liked(&self, target_event_id: &str) -> bool {
        self.records.read().contains_key(target_event_id)
    }

    pub fn get(&self, target_event_id: &str) -> Option<LikeRecord> {
        self.records.read().get(target_event_id).cloned()
    }

    pub fn reaction_id(&self, target_event_id: &str) -> Option<String> {
        self.records
            .read()
            .get(target_event_id)
            .map(|r| r.reaction_event_id.clone())
    }

    pub fn liked_ids(&self) -> HashSet<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Target ids by `created_at` descending, ties in insertion order.
    pub fn ordered_ids(&self) -> Vec<String> {
        self.ordered_records()
            .into_iter()
            .map(|r| r.target_event_id)
            .collect()
    }

    pub fn ordered_records(&self) -> Vec<LikeRecord> {
        let mut records: Vec<LikeRecord> = self.records.read().values().cloned().collect();
        // sort_by is stable
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Insert if absent or strictly newer than the current record.
    /// Returns whether the record was applied.
    pub fn upsert_if_newer(&self, record: LikeRecord) -> bool {
        let mut records = self.records.write();
        match records.get(&record.target_event_id) {
            Some(existing) if !record.supersedes(existing) => false,
            _ => {
                records.insert(record.target_event_id.clone(), record);
                true
            }
        }
    }

    /// Insert or overwrite unconditionally, keeping the entry's position.
    pub fn insert(&self, record: LikeRecord) -> Option<LikeRecord> {
        self.records
            .write()
            .insert(record.target_event_id.clone(), record)
    }

    pub fn remove(&self, target_event_id: &str) -> Option<LikeRecord> {
        self.records.write().shift_remove(target_event_id)
    }

    /// Remove every record matching `predicate`, returning the removed ones.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<LikeRecord>
    where
        F: FnMut(&LikeRecord) -> bool,
    {
        let mut records = self.records.write();
        let mut removed = Vec::new();
        records.retain(|_, record| {
            if predicate(record) {
                removed.push(record.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_newest_wins() {
        let index = InMemoryIndex::new();
        assert!(index.upsert_if_newer(LikeRecord::new("t", "r1", 10)));
        assert!(!index.upsert_if_newer(LikeRecord::new("t", "r0", 5)));
        assert!(!index.upsert_if_newer(LikeRecord::new("t", "r-same", 10)));
        assert!(index.upsert_if_newer(LikeRecord::new("t", "r2", 11)));

        assert_eq!(index.reaction_id("t"), Some("r2".to_string()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ordered_ids_ties_keep_insertion_order() {
        let index = InMemoryIndex::new();
        index.insert(LikeRecord::new("a", "ra", 5));
        index.insert(LikeRecord::new("b", "rb", 9));
        index.insert(LikeRecord::new("c", "rc", 5));
        index.insert(LikeRecord::new("d", "rd", 1));

        assert_eq!(index.ordered_ids(), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_insert_keeps_position() {
        let index = InMemoryIndex::new();
        index.insert(LikeRecord::new("a", "pending_like_1", 5));
        index.insert(LikeRecord::new("b", "rb", 5));
        index.insert(LikeRecord::new("a", "ra", 5));

        assert_eq!(index.ordered_ids(), vec!["a", "b"]);
        assert_eq!(index.reaction_id("a"), Some("ra".to_string()));
    }

    #[test]
    fn test_remove_where() {
        let index = InMemoryIndex::new();
        index.insert(LikeRecord::new("a", "ra", 1));
        index.insert(LikeRecord::new("b", "pending_like_x", 2));
        index.insert(LikeRecord::new("c", "rc", 3));

        let removed = index.remove_where(|r| !r.is_pending() && r.target_event_id != "c");
        assert_eq!(removed, vec![LikeRecord::new("a", "ra", 1)]);
        assert_eq!(index.ordered_ids(), vec!["c", "b"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let index = InMemoryIndex::new();
        index.insert(LikeRecord::new("a", "ra", 1));
        assert!(index.is_liked("a"));
        assert_eq!(index.remove("a").map(|r| r.reaction_event_id), Some("ra".into()));
        assert!(!index.is_liked("a"));

        index.insert(LikeRecord::new("b", "rb", 1));
        index.clear();
        assert!(index.is_empty());
        assert!(index.liked_ids().is_empty());
    }
}
