//! The facade the rest of the application talks to.
//!
//! Reads (`is_liked`, `liked_event_ids`, ...) answer from the in-memory index
//! and never touch the network. Writes are optimistic: online they publish
//! first and update local state on success; offline they update local state
//! with a placeholder reaction id and hand the intent to the offline queue.

use crate::cfg::SyncConfig;
use crate::core::error::LikeError;
use crate::core::types::{
    Event, Filter, Kind, LikeRecord, LikeRequest, ReactionContent, ReconciliationResult,
};
use crate::core::util::{pending_reaction_id, unix_now};
use crate::storage::{DurableStore, LikedIdsStream, NullDurableStore};
use crate::sync::offline::{Connectivity, OfflineAction, OfflineActionQueue};
use crate::sync::realtime::{RealtimeHandle, RealtimeProcessor};
use crate::sync::{CountAggregator, LocalLikes, ReconciliationEngine, TargetLocks};
use crate::transport::EventTransport;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Repository {
    config: SyncConfig,
    transport: Arc<dyn EventTransport>,
    local: Arc<LocalLikes>,
    offline_queue: Arc<dyn OfflineActionQueue>,
    connectivity: Arc<dyn Connectivity>,
    reconciler: ReconciliationEngine,
    counts: CountAggregator,
    locks: TargetLocks,
    realtime: tokio::sync::Mutex<Option<RealtimeHandle>>,
    disposed: AtomicBool,
}

impl Repository {
    pub fn builder(config: SyncConfig) -> RepositoryBuilder {
        RepositoryBuilder::new(config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Load stored likes into memory and, with signing keys, start following
    /// the identity's live reactions. Safe to call more than once; only the
    /// first successful call subscribes.
    pub async fn initialize(&self) -> Result<(), LikeError> {
        match self.local.load_from_store().await {
            Ok(loaded) => info!(loaded, liked = self.local.index().len(), "Loaded stored likes"),
            Err(e) => warn!("Failed to load stored likes, starting from memory: {}", e),
        }

        if !self.transport.has_keys() {
            info!("No signing keys, running read-only without live updates");
            return Ok(());
        }
        if !self.config.realtime_enabled || self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut realtime = self.realtime.lock().await;
        if realtime.is_some() {
            debug!("Live like subscription already open");
            return Ok(());
        }

        let filter = Filter::new()
            .author(self.transport.public_key())
            .kind(Kind::REACTION)
            .since(unix_now());
        match self
            .transport
            .subscribe(vec![filter], &self.config.subscription_id)
            .await
        {
            Ok(events) => {
                info!(
                    subscription_id = %self.config.subscription_id,
                    "Subscribed to live likes"
                );
                *realtime = Some(RealtimeProcessor::new(self.local.clone()).spawn(events));
            }
            Err(e) => warn!("Failed to subscribe to live likes: {}", e),
        }
        Ok(())
    }

    pub fn is_liked(&self, target_event_id: &str) -> bool {
        self.local.index().is_liked(target_event_id)
    }

    pub fn liked_event_ids(&self) -> HashSet<String> {
        self.local.index().liked_ids()
    }

    /// Liked targets, most recently liked first.
    pub fn ordered_liked_event_ids(&self) -> Vec<String> {
        self.local.index().ordered_ids()
    }

    /// Like a target. Returns the reaction id, a placeholder while offline.
    pub async fn like_event(&self, request: LikeRequest) -> Result<String, LikeError> {
        let _guard = self.locks.lock(&request.event_id).await;
        self.like_locked(&request).await
    }

    pub async fn unlike_event(&self, target_event_id: &str) -> Result<(), LikeError> {
        let _guard = self.locks.lock(target_event_id).await;
        self.unlike_locked(target_event_id).await
    }

    /// Flip the liked state. Returns the new state.
    pub async fn toggle_like(&self, request: LikeRequest) -> Result<bool, LikeError> {
        let _guard = self.locks.lock(&request.event_id).await;
        if self.local.lookup(&request.event_id).await?.is_some() {
            self.unlike_locked(&request.event_id).await?;
            Ok(false)
        } else {
            self.like_locked(&request).await?;
            Ok(true)
        }
    }

    /// Publish a like without checking connectivity. A placeholder record for
    /// the target is upgraded in place.
    pub async fn execute_like_action(&self, request: LikeRequest) -> Result<String, LikeError> {
        let _guard = self.locks.lock(&request.event_id).await;
        self.execute_like_locked(&request).await
    }

    /// Delete the published like without checking connectivity.
    pub async fn execute_unlike_action(&self, target_event_id: &str) -> Result<(), LikeError> {
        let _guard = self.locks.lock(target_event_id).await;
        let record = self
            .local
            .lookup(target_event_id)
            .await?
            .ok_or_else(|| LikeError::NotLiked(target_event_id.to_string()))?;
        self.unpublish(record).await
    }

    /// Bring the network in line with an action recorded while offline.
    ///
    /// A like is published only if its target still holds a placeholder
    /// record; if the user unliked again before reconnecting there is nothing
    /// to publish. An unlike deletes the reaction it captured, and a captured
    /// placeholder never reached the network.
    pub async fn replay_offline_action(&self, action: &OfflineAction) -> Result<(), LikeError> {
        let target = action.target_event_id.as_str();
        let _guard = self.locks.lock(target).await;

        if action.is_like {
            return match self.local.lookup(target).await? {
                Some(record) if record.is_pending() => self
                    .execute_like_locked(&action.like_request())
                    .await
                    .map(|_| ()),
                Some(_) => Err(LikeError::AlreadyLiked(target.to_string())),
                None => {
                    debug!(target_event_id = target, "Offline like was undone, nothing to publish");
                    Ok(())
                }
            };
        }

        let Some(reaction_event_id) = action.published_reaction_id() else {
            debug!(target_event_id = target, "Offline unlike of an unpublished like");
            return Ok(());
        };
        self.delete_reaction(target, reaction_event_id).await?;

        let still_current = self
            .local
            .index()
            .reaction_id(target)
            .is_some_and(|id| id == reaction_event_id);
        if still_current {
            self.forget_unpublished(target).await;
        }
        Ok(())
    }

    /// Likes of a single item across both addressing schemes.
    pub async fn like_count(&self, target_event_id: &str, addressable_id: Option<&str>) -> u64 {
        self.counts.like_count(target_event_id, addressable_id).await
    }

    /// Batch form of [`Repository::like_count`]. `addressable_ids` maps target
    /// event ids to coordinates.
    pub async fn like_counts(
        &self,
        target_event_ids: &[String],
        addressable_ids: Option<&HashMap<String, String>>,
    ) -> HashMap<String, u64> {
        let empty = HashMap::new();
        self.counts
            .like_counts(target_event_ids, addressable_ids.unwrap_or(&empty))
            .await
    }

    pub async fn like_record(&self, target_event_id: &str) -> Option<LikeRecord> {
        match self.local.lookup(target_event_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(target_event_id, "Failed to read stored like: {}", e);
                self.local.index().get(target_event_id)
            }
        }
    }

    pub async fn clear_cache(&self) -> Result<(), LikeError> {
        self.local.clear().await?;
        info!("Cleared like cache");
        Ok(())
    }

    pub fn watch_liked_event_ids(&self) -> LikedIdsStream {
        self.local.store().watch_liked_event_ids()
    }

    /// Target ids liked by any identity, newest first. Not merged into local
    /// state.
    pub async fn fetch_user_likes(&self, pubkey: &str) -> Result<Vec<String>, LikeError> {
        let filter = Filter::new()
            .author(pubkey)
            .kind(Kind::REACTION)
            .limit(self.config.history_limit);
        let events = self
            .transport
            .query_events(vec![filter])
            .await
            .map_err(|e| LikeError::FetchLikesFailed {
                pubkey: pubkey.to_string(),
                reason: e.to_string(),
            })?;

        let mut likes: Vec<&Event> = events.iter().filter(|event| event.is_like()).collect();
        likes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(likes
            .into_iter()
            .filter_map(Event::reaction_target)
            .unique()
            .map(str::to_string)
            .collect())
    }

    pub async fn sync_user_reactions(&self) -> Result<ReconciliationResult, LikeError> {
        self.reconciler.sync_user_reactions().await
    }

    /// Stop live updates and close watcher streams. Idempotent. Local state
    /// stays readable and `clear_cache` keeps working.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.realtime.lock().await.take() {
            handle.shutdown().await;
        }
        self.local.store().close();
        info!("Like repository disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn like_locked(&self, request: &LikeRequest) -> Result<String, LikeError> {
        let target = request.event_id.as_str();
        if self.local.lookup(target).await?.is_some() {
            return Err(LikeError::AlreadyLiked(target.to_string()));
        }

        if !self.is_online() {
            let placeholder = pending_reaction_id();
            self.local
                .insert(LikeRecord::new(target, placeholder.clone(), unix_now()))
                .await?;
            self.offline_queue.enqueue(OfflineAction::like(request));
            info!(target_event_id = target, reaction_event_id = %placeholder, "Liked offline");
            return Ok(placeholder);
        }

        self.publish_like(request).await
    }

    async fn unlike_locked(&self, target_event_id: &str) -> Result<(), LikeError> {
        let record = self
            .local
            .lookup(target_event_id)
            .await?
            .ok_or_else(|| LikeError::NotLiked(target_event_id.to_string()))?;

        if !self.is_online() {
            self.local.remove(target_event_id).await?;
            self.offline_queue.enqueue(OfflineAction::unlike(
                target_event_id,
                Some(record.reaction_event_id),
            ));
            info!(target_event_id, "Unliked offline");
            return Ok(());
        }

        self.unpublish(record).await
    }

    async fn execute_like_locked(&self, request: &LikeRequest) -> Result<String, LikeError> {
        if let Some(existing) = self.local.lookup(&request.event_id).await? {
            if !existing.is_pending() {
                return Err(LikeError::AlreadyLiked(request.event_id.clone()));
            }
        }
        self.publish_like(request).await
    }

    async fn publish_like(&self, request: &LikeRequest) -> Result<String, LikeError> {
        let target = request.event_id.as_str();
        let event = self
            .transport
            .send_like(
                target,
                ReactionContent::Like,
                request.addressable_id.as_deref(),
                &request.author_pubkey,
                request.target_kind,
            )
            .await
            .map_err(|e| LikeError::like_failed(target, e))?
            .ok_or_else(|| LikeError::like_failed(target, "rejected by all relays"))?;

        self.remember_published(LikeRecord::new(target, event.id.clone(), event.created_at))
            .await;
        info!(target_event_id = target, reaction_event_id = %event.id, "Published like");
        Ok(event.id)
    }

    /// Remove a like the network may know about. Placeholders are removed
    /// locally only; published reactions are removed after the deletion is
    /// accepted.
    async fn unpublish(&self, record: LikeRecord) -> Result<(), LikeError> {
        let target = record.target_event_id.as_str();
        if record.is_pending() {
            self.local.remove(target).await?;
        } else {
            self.delete_reaction(target, &record.reaction_event_id).await?;
            self.forget_unpublished(target).await;
        }
        info!(
            target_event_id = target,
            reaction_event_id = %record.reaction_event_id,
            "Removed like"
        );
        Ok(())
    }

    // The network change has already happened. On a store failure the index
    // alone reflects it until the next sync rewrites the store.
    async fn remember_published(&self, record: LikeRecord) {
        if let Err(e) = self.local.insert(record.clone()).await {
            warn!(
                target_event_id = %record.target_event_id,
                "Failed to persist published like, keeping it in memory: {}", e
            );
            self.local.index().insert(record);
            self.local.notify();
        }
    }

    async fn forget_unpublished(&self, target_event_id: &str) {
        if let Err(e) = self.local.remove(target_event_id).await {
            warn!(
                target_event_id,
                "Failed to remove deleted like from the store, dropping it from memory: {}", e
            );
            self.local.index().remove(target_event_id);
            self.local.notify();
        }
    }

    async fn delete_reaction(
        &self,
        target_event_id: &str,
        reaction_event_id: &str,
    ) -> Result<(), LikeError> {
        match self.transport.delete_event(reaction_event_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(LikeError::unlike_failed(
                target_event_id,
                "deletion rejected by all relays",
            )),
            Err(e) => Err(LikeError::unlike_failed(target_event_id, e)),
        }
    }
}

/// Builder for [`Repository`]. A transport and an offline queue are
/// required; the store defaults to [`NullDurableStore`] and connectivity to
/// always online.
pub struct RepositoryBuilder {
    config: SyncConfig,
    transport: Option<Arc<dyn EventTransport>>,
    store: Option<Arc<dyn DurableStore>>,
    offline_queue: Option<Arc<dyn OfflineActionQueue>>,
    connectivity: Option<Arc<dyn Connectivity>>,
}

impl RepositoryBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            transport: None,
            store: None,
            offline_queue: None,
            connectivity: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn offline_queue(mut self, queue: Arc<dyn OfflineActionQueue>) -> Self {
        self.offline_queue = Some(queue);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn build(self) -> Result<Repository, &'static str> {
        let transport = self.transport.ok_or("transport is required")?;
        let offline_queue = self.offline_queue.ok_or("offline_queue is required")?;
        let store = self.store.unwrap_or_else(|| {
            Arc::new(NullDurableStore::with_capacity(self.config.watch_capacity))
        });
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(|| true) as Arc<dyn Connectivity>);

        let local = Arc::new(LocalLikes::new(store));
        let reconciler =
            ReconciliationEngine::new(transport.clone(), local.clone(), self.config.history_limit);
        let counts = CountAggregator::new(transport.clone());

        Ok(Repository {
            config: self.config,
            transport,
            local,
            offline_queue,
            connectivity,
            reconciler,
            counts,
            locks: TargetLocks::new(),
            realtime: tokio::sync::Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }
}
