//! Durable mirror of the like index.
//!
//! The in-memory index is authoritative while the process runs; a
//! [`DurableStore`] only has to survive restarts and report changes.
//!
//! ```text
//! Repository ─→ LocalLikes ─→ InMemoryIndex
//!                    └──────→ DurableStore ─→ watch_liked_event_ids()
//! ```

pub mod file;
pub mod memory;
pub mod null;
mod watch;

pub use file::FileDurableStore;
pub use memory::MemoryDurableStore;
pub use null::NullDurableStore;

use crate::core::error::StoreError;
use crate::core::types::LikeRecord;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashSet;

/// Stream of liked target id snapshots.
pub type LikedIdsStream = BoxStream<'static, HashSet<String>>;

/// Default buffer of the liked-ids broadcast.
pub const DEFAULT_WATCH_CAPACITY: usize = 64;

/// Persistent key-value mirror of [`LikeRecord`]s keyed by target event id.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn all_like_records(&self) -> Result<Vec<LikeRecord>, StoreError>;

    async fn like_record(&self, target_event_id: &str) -> Result<Option<LikeRecord>, StoreError>;

    /// Insert or overwrite the record for its target.
    async fn save_like_record(&self, record: &LikeRecord) -> Result<(), StoreError>;

    async fn save_like_records_batch(&self, records: &[LikeRecord]) -> Result<(), StoreError>;

    /// Returns whether a record existed.
    async fn delete_like_record(&self, target_event_id: &str) -> Result<bool, StoreError>;

    async fn clear_all(&self) -> Result<(), StoreError>;

    /// Snapshots of the liked target ids, one per change.
    fn watch_liked_event_ids(&self) -> LikedIdsStream;

    /// Called after every local mutation with the current liked ids. Stores
    /// that emit their own change events ignore it.
    fn notify_liked_ids(&self, _ids: &HashSet<String>) {}

    /// Close change streams. Later notifications are dropped.
    fn close(&self) {}

    /// False for stores that keep nothing.
    fn is_persistent(&self) -> bool {
        true
    }
}
